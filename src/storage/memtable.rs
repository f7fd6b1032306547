//! MemTable
//!
//! In-memory ordered table for recent writes of one database.
//!
//! BTreeMap wrapped in a RwLock:
//! - Ordered keys (required for table flushes and seeks)
//! - Many concurrent readers, one writer at a time

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    fn footprint(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }
}

/// Frozen, sorted copy of a memtable taken for iteration
pub type MemTableSnapshot = Arc<Vec<(Vec<u8>, MemTableEntry)>>;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,

    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Insert a value; returns the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Value(value))
    }

    /// Insert a tombstone; returns the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Tombstone)
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let mut data = self.data.write();
        let added = key.len() + entry.footprint();
        let key_len = key.len();

        match data.insert(key, entry) {
            Some(old) => {
                let removed = key_len + old.footprint();
                if added >= removed {
                    self.size.fetch_add(added - removed, Ordering::SeqCst) + added - removed
                } else {
                    self.size.fetch_sub(removed - added, Ordering::SeqCst) - (removed - added)
                }
            }
            None => self.size.fetch_add(added, Ordering::SeqCst) + added,
        }
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy all entries out in key order
    pub fn snapshot(&self) -> MemTableSnapshot {
        let data = self.data.read();
        Arc::new(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Drop all entries (after a successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
