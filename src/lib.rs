//! # TenantKV
//!
//! A multi-tenant key-value service:
//! - Clients name a logical database; it is created on first use
//! - One storage handle per database, shared by every caller
//! - Prefix scans and multi-key fetches streamed item by item
//! - TCP-based framed protocol with status codes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │              (one thread per connection)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Request Dispatcher                         │
//! │                     (KvService)                             │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ resolve(name)                    │ StreamGet
//!            ▼                                  ▼
//!   ┌─────────────────┐               ┌───────────────────┐
//!   │    DbManager    │               │ Retrieval Pipeline│
//!   │ (RwLock<HashMap>│               │ (bounded channel) │
//!   └────────┬────────┘               └─────────┬─────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────────────────────────────────────────┐
//!   │          Database handle  ──►  StorageEngine         │
//!   │               (LsmEngine: WAL, MemTable, SSTables)   │
//!   └─────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod handle;
pub mod manager;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod service;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use error::{Result, TenantError};
pub use handle::Database;
pub use manager::DbManager;
pub use pipeline::{PipelineState, Query, ResultItem, ResultStream};
pub use service::KvService;
pub use storage::{EngineIterator, LsmEngine, StorageEngine};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TenantKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
