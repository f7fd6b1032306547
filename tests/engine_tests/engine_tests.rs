//! Tests for the bundled LSM engine
//!
//! These tests verify:
//! - Point operations through the StorageEngine trait
//! - Crash recovery from the WAL, including a torn tail
//! - Tables persisting across reopen
//! - Iterator seek and snapshot behaviour
//! - Sorted table build/read and corruption detection

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use tenantkv::config::WalSyncStrategy;
use tenantkv::storage::wal::{Operation, WalRecovery, WalWriter};
use tenantkv::storage::{
    EngineOptions, Lookup, ReadOptions, TableBuilder, TableReader, WriteOptions,
};
use tenantkv::{EngineIterator, LsmEngine, StorageEngine, TenantError};

// =============================================================================
// Helper Functions
// =============================================================================

fn options() -> EngineOptions {
    EngineOptions {
        wal_sync_strategy: WalSyncStrategy::EveryWrite,
        memtable_size_limit: 1024 * 1024,
    }
}

fn open(path: &Path) -> LsmEngine {
    LsmEngine::open(path, &options()).unwrap()
}

fn put(engine: &LsmEngine, key: &str, value: &str) {
    engine
        .put(key.as_bytes(), value.as_bytes(), &WriteOptions::default())
        .unwrap();
}

fn scan(engine: &LsmEngine, from: &[u8]) -> Vec<String> {
    let mut iter = engine.iter().unwrap();
    iter.seek(from);
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(String::from_utf8(iter.key().to_vec()).unwrap());
        iter.next();
    }
    iter.status().unwrap();
    keys
}

// =============================================================================
// Point Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path());

    put(&engine, "hello", "world");
    assert_eq!(engine.get(b"hello", &ReadOptions::default()).unwrap(), Some(b"world".to_vec()));

    engine.delete(b"hello", &WriteOptions::default()).unwrap();
    assert_eq!(engine.get(b"hello", &ReadOptions::default()).unwrap(), None);
}

#[test]
fn test_overwrite_keeps_latest() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path());

    put(&engine, "k", "v1");
    engine.flush().unwrap();
    put(&engine, "k", "v2");

    assert_eq!(engine.get(b"k", &ReadOptions::default()).unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_delete_absent_key_succeeds() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path());

    engine.delete(b"never-written", &WriteOptions::default()).unwrap();
    assert_eq!(engine.get(b"never-written", &ReadOptions::default()).unwrap(), None);
}

#[test]
fn test_tombstone_hides_flushed_value() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path());

    put(&engine, "k", "v");
    engine.flush().unwrap();
    engine.delete(b"k", &WriteOptions::default()).unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.table_count(), 2);
    assert_eq!(engine.get(b"k", &ReadOptions::default()).unwrap(), None);
    assert!(scan(&engine, b"").is_empty());
}

#[test]
fn test_synced_writes() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path());

    engine
        .put(b"durable", b"yes", &WriteOptions { sync: true })
        .unwrap();
    assert_eq!(engine.get(b"durable", &ReadOptions::default()).unwrap(), Some(b"yes".to_vec()));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_close_then_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open(temp.path());
        put(&engine, "a", "1");
        put(&engine, "b", "2");
        engine.close().unwrap();
    }

    let engine = open(temp.path());
    assert_eq!(engine.get(b"a", &ReadOptions::default()).unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b", &ReadOptions::default()).unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.memtable_entry_count(), 0);
}

#[test]
fn test_recovery_without_close() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open(temp.path());
        put(&engine, "a", "1");
        put(&engine, "b", "2");
        engine.delete(b"a", &WriteOptions::default()).unwrap();
    }

    let engine = open(temp.path());
    assert_eq!(engine.get(b"a", &ReadOptions::default()).unwrap(), None);
    assert_eq!(engine.get(b"b", &ReadOptions::default()).unwrap(), Some(b"2".to_vec()));

    // The recovered WAL was folded into a table and emptied
    assert_eq!(fs::metadata(temp.path().join("wal.log")).unwrap().len(), 0);
}

#[test]
fn test_recovery_drops_torn_tail() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open(temp.path());
        put(&engine, "a", "1");
        put(&engine, "b", "2");
    }

    // Half of an entry header: what a crash mid-append leaves behind
    let mut wal = OpenOptions::new()
        .append(true)
        .open(temp.path().join("wal.log"))
        .unwrap();
    wal.write_all(&[0x07, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
    drop(wal);

    let engine = open(temp.path());
    assert_eq!(scan(&engine, b""), vec!["a", "b"]);

    put(&engine, "c", "3");
    assert_eq!(engine.get(b"c", &ReadOptions::default()).unwrap(), Some(b"3".to_vec()));
}

#[test]
fn test_wal_recovery_stops_at_corruption() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("wal.log");

    let mut writer = WalWriter::open(&path, WalSyncStrategy::EveryWrite, 0).unwrap();
    for i in 0..3 {
        writer
            .append(
                Operation::Put {
                    key: format!("key{}", i).into_bytes(),
                    value: b"value".to_vec(),
                },
                false,
            )
            .unwrap();
    }
    drop(writer);

    // Flip the last byte: the final entry's checksum no longer matches
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, entries[1].lsn);
    assert!(result.was_truncated);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_seek_positions_at_first_key_not_less() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path());

    for key in ["apple", "banana", "cherry", "date"] {
        put(&engine, key, "x");
    }

    assert_eq!(scan(&engine, b"b"), vec!["banana", "cherry", "date"]);
    assert_eq!(scan(&engine, b"c"), vec!["cherry", "date"]);
    assert!(scan(&engine, b"z").is_empty());
}

#[test]
fn test_iterator_outlives_flush() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path());

    put(&engine, "k1", "v1");
    put(&engine, "k2", "v2");
    let mut iter = engine.iter().unwrap();
    engine.flush().unwrap();
    engine.delete(b"k1", &WriteOptions::default()).unwrap();

    iter.seek(b"");
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(iter.key().to_vec());
        iter.next();
    }
    assert_eq!(keys, vec![b"k1".to_vec(), b"k2".to_vec()]);
}

#[test]
fn test_concurrent_writers_and_readers() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(
        LsmEngine::open(
            temp.path(),
            &EngineOptions {
                wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
                memtable_size_limit: 4 * 1024,
            },
        )
        .unwrap(),
    );

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("t{}-{:03}", t, i);
                    engine
                        .put(key.as_bytes(), b"value", &WriteOptions::default())
                        .unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..20 {
                let keys = scan(&engine, b"t");
                assert!(keys.windows(2).all(|w| w[0] < w[1]));
            }
        })
    };

    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(scan(&engine, b"t").len(), 400);
    assert!(engine.table_count() > 0);
}

// =============================================================================
// Sorted Table Tests
// =============================================================================

#[test]
fn test_table_build_and_lookup() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("sstable_000001.sst");

    let mut builder = TableBuilder::new(&path).unwrap();
    builder.add(b"a", b"1").unwrap();
    builder.add_tombstone(b"b").unwrap();
    builder.add(b"c", b"3").unwrap();
    let meta = builder.finish().unwrap();
    assert_eq!(meta.entry_count, 3);

    let reader = TableReader::open(&path).unwrap();
    assert_eq!(reader.get(b"a").unwrap(), Lookup::Found(b"1".to_vec()));
    assert_eq!(reader.get(b"b").unwrap(), Lookup::Deleted);
    assert_eq!(reader.get(b"d").unwrap(), Lookup::Absent);
}

#[test]
fn test_table_builder_rejects_unsorted_keys() {
    let temp = TempDir::new().unwrap();
    let mut builder = TableBuilder::new(&temp.path().join("t.sst")).unwrap();

    builder.add(b"b", b"1").unwrap();
    assert!(builder.add(b"a", b"2").is_err());
}

#[test]
fn test_corrupt_table_fails_to_open() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("sstable_000001.sst");

    let mut builder = TableBuilder::new(&path).unwrap();
    builder.add(b"key", b"value").unwrap();
    builder.finish().unwrap();

    // Damage the first data byte after the header
    let mut bytes = fs::read(&path).unwrap();
    bytes[20] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(TableReader::open(&path), Err(TenantError::Storage(_))));
}
