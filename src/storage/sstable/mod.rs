//! Sorted tables
//!
//! Immutable on-disk sorted key-value files written by memtable flushes.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "TKVS" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | Padding (4) │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod cursor;
mod reader;

use std::path::PathBuf;

pub use builder::TableBuilder;
pub use cursor::TableCursor;
pub use reader::{Lookup, TableReader};

pub(crate) const MAGIC: &[u8; 4] = b"TKVS";
pub(crate) const VERSION: u16 = 1;

/// Magic (4) + Version (2) + EntryCount (8)
pub(crate) const HEADER_SIZE: u64 = 14;

/// IndexOffset (8) + DataCRC (4) + Padding (4)
pub(crate) const FOOTER_SIZE: u64 = 16;

pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Metadata returned when a table is finished
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub path: PathBuf,
    pub entry_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}

/// Entry header: `[key_len u32][val_len u32]`, little-endian
pub(crate) fn parse_entry_header(header: &[u8; 8]) -> (usize, Option<usize>) {
    let mut key_len = [0u8; 4];
    let mut val_len = [0u8; 4];
    key_len.copy_from_slice(&header[0..4]);
    val_len.copy_from_slice(&header[4..8]);

    let val_len = u32::from_le_bytes(val_len);
    let value_len = if val_len == TOMBSTONE_MARKER {
        None
    } else {
        Some(val_len as usize)
    };
    (u32::from_le_bytes(key_len) as usize, value_len)
}
