//! Storage Module
//!
//! The ordered key-value engine behind every logical database.
//!
//! The rest of the crate talks to an engine only through [`StorageEngine`]
//! and [`EngineIterator`]. [`LsmEngine`] is the bundled implementation:
//!
//! ```text
//!   put/delete ──► WAL (append, CRC) ──► MemTable (BTreeMap, RwLock)
//!                                            │ size limit reached
//!                                            ▼
//!                                  sstables/sstable_NNNNNN.sst
//!
//!   get      ──► MemTable ──► tables newest → oldest
//!   iter()   ──► SnapshotIter (memtable copy + table cursors, merged)
//! ```

mod iterator;
mod lsm;
mod memtable;
mod sstable;
mod tables;
pub mod wal;

use std::path::Path;

use crate::config::{Config, WalSyncStrategy};
use crate::error::Result;

pub use iterator::SnapshotIter;
pub use lsm::LsmEngine;
pub use memtable::{MemTable, MemTableEntry};
pub use sstable::{Lookup, TableBuilder, TableCursor, TableMeta, TableReader};
pub use tables::TableSet;

/// Engine tuning derived from the service config
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub wal_sync_strategy: WalSyncStrategy,
    pub memtable_size_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions::from(&Config::default())
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            wal_sync_strategy: config.wal_sync_strategy,
            memtable_size_limit: config.memtable_size_limit,
        }
    }
}

/// Per-read options
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Hint that values read should be kept in any engine cache; the bundled
    /// engine has no block cache and ignores it
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { fill_cache: true }
    }
}

/// Per-write options
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// fsync the WAL before the write returns
    pub sync: bool,
}

/// An ordered key-value engine bound to one directory
///
/// Implementations must be safe for concurrent point operations and
/// concurrent iteration.
pub trait StorageEngine: Send + Sync + Sized + 'static {
    type Iter: EngineIterator + Send + 'static;

    /// Open the engine at `path`, creating the directory if missing
    fn open(path: &Path, options: &EngineOptions) -> Result<Self>;

    fn put(&self, key: &[u8], value: &[u8], opts: &WriteOptions) -> Result<()>;

    /// `Ok(None)` when the key is absent
    fn get(&self, key: &[u8], opts: &ReadOptions) -> Result<Option<Vec<u8>>>;

    /// Deleting an absent key succeeds
    fn delete(&self, key: &[u8], opts: &WriteOptions) -> Result<()>;

    /// Iterator over a consistent snapshot; unpositioned until `seek`
    fn iter(&self) -> Result<Self::Iter>;

    /// Make everything durable and release engine resources
    fn close(&self) -> Result<()>;
}

/// Cursor-style forward iterator, modelled on the classic LSM iterator API
pub trait EngineIterator {
    /// Position at the first key >= `target`
    fn seek(&mut self, target: &[u8]);

    fn valid(&self) -> bool;

    /// Current key; only meaningful while `valid()`
    fn key(&self) -> &[u8];

    /// Current value; only meaningful while `valid()`
    fn value(&self) -> &[u8];

    fn next(&mut self);

    /// Fault that ended the traversal, if any
    fn status(&self) -> Result<()>;
}
