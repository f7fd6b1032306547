//! Write-Ahead Log (WAL)
//!
//! Each database appends every mutation here before applying it to the
//! memtable, so unflushed writes survive a crash.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2 ...                             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! `Data` is the bincode encoding of an [`Operation`]; the CRC covers it.

mod entry;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
