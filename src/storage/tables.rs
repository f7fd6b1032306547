//! Table Set
//!
//! Tracks the sorted tables of one database.
//!
//! ## Responsibilities
//! - Discover existing tables on startup
//! - Search tables newest → oldest for reads
//! - Create new tables from memtable flushes
//! - Hand out snapshots of the current table list to iterators

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, TenantError};

use super::memtable::{MemTable, MemTableEntry};
use super::sstable::{Lookup, TableBuilder, TableMeta, TableReader};

/// The tables of one database
///
/// ## Concurrency:
/// - `tables`: RwLock (many concurrent readers, exclusive writer on flush)
/// - `next_table_id`: atomic counter
pub struct TableSet {
    dir: PathBuf,

    /// Open readers, ordered newest → oldest
    tables: RwLock<Vec<Arc<TableReader>>>,

    next_table_id: AtomicU64,
}

impl TableSet {
    /// Open or create the table directory and load every table in it
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = Self::parse_table_id(&path) {
                    ids.push(id);
                }
            }
        }

        // Newest (highest id) first
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut tables = Vec::with_capacity(ids.len());
        for id in &ids {
            let reader = TableReader::open(&Self::table_path(dir, *id))?;
            tables.push(Arc::new(reader));
        }

        let next_id = ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            dir: dir.to_path_buf(),
            tables: RwLock::new(tables),
            next_table_id: AtomicU64::new(next_id),
        })
    }

    /// Look a key up newest → oldest
    ///
    /// `Ok(None)` means absent or deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tables = self.snapshot();

        for table in tables.iter() {
            if !table.might_contain(key) {
                continue;
            }
            match table.get(key)? {
                Lookup::Found(value) => return Ok(Some(value)),
                Lookup::Deleted => return Ok(None),
                Lookup::Absent => continue,
            }
        }

        Ok(None)
    }

    /// Write a memtable out as a new table
    pub fn flush(&self, memtable: &MemTable) -> Result<TableMeta> {
        if memtable.is_empty() {
            return Err(TenantError::Storage("Cannot flush empty MemTable".to_string()));
        }

        let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let path = Self::table_path(&self.dir, id);

        let mut builder = TableBuilder::new(&path)?;
        for (key, entry) in memtable.snapshot().iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(key, v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(key)?,
            }
        }
        let meta = builder.finish()?;

        let reader = TableReader::open(&path)?;
        self.tables.write().insert(0, Arc::new(reader));

        tracing::debug!(
            "Flushed {} entries to {}",
            meta.entry_count,
            meta.path.display()
        );
        Ok(meta)
    }

    /// Current tables, newest first
    pub fn snapshot(&self) -> Vec<Arc<TableReader>> {
        self.tables.read().clone()
    }

    pub fn count(&self) -> usize {
        self.tables.read().len()
    }

    pub fn next_table_id(&self) -> u64 {
        self.next_table_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn table_path(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_table_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("sstable_")?.parse().ok()
    }
}
