//! LSM Engine
//!
//! Coordinates WAL, MemTable and tables for one database directory.
//!
//! ## Responsibilities
//! - Recover unflushed writes from the WAL on open
//! - Serialize writers; let readers run concurrently
//! - Flush the memtable when it grows past the limit
//! - Produce snapshot iterators

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

use super::iterator::SnapshotIter;
use super::memtable::{MemTable, MemTableEntry};
use super::tables::TableSet;
use super::wal::{Operation, WalRecovery, WalWriter};
use super::{EngineOptions, ReadOptions, StorageEngine, WriteOptions};

/// Log-structured engine for a single database
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (put/delete/flush) and iterator creation are serialized by
///   `write_lock`, so every iterator sees a state between two writes.
/// - **Reads** (get) take no engine lock; the memtable and table list guard
///   themselves with their own RwLocks.
pub struct LsmEngine {
    data_dir: PathBuf,
    options: EngineOptions,
    wal: Mutex<WalWriter>,
    memtable: MemTable,
    tables: TableSet,
    write_lock: Mutex<()>,
}

impl LsmEngine {
    const WAL_FILENAME: &'static str = "wal.log";
    const TABLE_DIR: &'static str = "sstables";

    /// Force a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_locked()
    }

    /// Called with `write_lock` held
    fn flush_locked(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.tables.flush(&self.memtable)?;
        self.memtable.clear();
        self.wal.lock().truncate()?;
        Ok(())
    }

    fn apply(&self, operation: Operation, opts: &WriteOptions) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        self.wal.lock().append(operation.clone(), opts.sync)?;

        let new_size = match operation {
            Operation::Put { key, value } => self.memtable.put(key, value),
            Operation::Delete { key } => self.memtable.delete(key),
        };

        if new_size >= self.options.memtable_size_limit {
            self.flush_locked()?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn table_count(&self) -> usize {
        self.tables.count()
    }
}

impl StorageEngine for LsmEngine {
    type Iter = SnapshotIter;

    /// Open or create the engine
    ///
    /// On startup:
    /// 1. Create the data and table directories
    /// 2. Load existing tables
    /// 3. Replay the WAL into the memtable and flush it to a table
    /// 4. Truncate the WAL
    fn open(path: &Path, options: &EngineOptions) -> Result<Self> {
        fs::create_dir_all(path)?;

        let table_dir = path.join(Self::TABLE_DIR);
        let wal_path = path.join(Self::WAL_FILENAME);

        let tables = TableSet::open(&table_dir)?;
        let memtable = MemTable::new();

        let mut last_lsn = 0;
        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery for {}: {} entries recovered, {} corrupted, last_lsn={}",
                    path.display(),
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }
            last_lsn = recovery.last_lsn;

            for entry in entries {
                match entry.operation {
                    Operation::Put { key, value } => memtable.put(key, value),
                    Operation::Delete { key } => memtable.delete(key),
                };
            }

            // Recovered data goes to a table before the WAL is reused
            if !memtable.is_empty() {
                tables.flush(&memtable)?;
                memtable.clear();
            }
        }

        let mut wal = WalWriter::open(&wal_path, options.wal_sync_strategy, last_lsn)?;
        if last_lsn > 0 {
            wal.truncate()?;
        }

        Ok(Self {
            data_dir: path.to_path_buf(),
            options: *options,
            wal: Mutex::new(wal),
            memtable,
            tables,
            write_lock: Mutex::new(()),
        })
    }

    fn put(&self, key: &[u8], value: &[u8], opts: &WriteOptions) -> Result<()> {
        self.apply(
            Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            },
            opts,
        )
    }

    /// Search order: memtable, then tables newest → oldest
    fn get(&self, key: &[u8], _opts: &ReadOptions) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return Ok(match entry {
                MemTableEntry::Value(value) => Some(value),
                MemTableEntry::Tombstone => None,
            });
        }
        self.tables.get(key)
    }

    fn delete(&self, key: &[u8], opts: &WriteOptions) -> Result<()> {
        self.apply(Operation::Delete { key: key.to_vec() }, opts)
    }

    fn iter(&self) -> Result<SnapshotIter> {
        let _write_guard = self.write_lock.lock();
        let memtable = self.memtable.snapshot();
        let tables = self.tables.snapshot();
        SnapshotIter::new(memtable, &tables)
    }

    /// Flush pending data and sync the WAL
    fn close(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_locked()?;
        self.wal.lock().sync()
    }
}
