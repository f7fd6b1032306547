//! Tests for DbManager
//!
//! These tests verify:
//! - One handle per name, shared by every caller
//! - Distinct names get distinct handles and directories
//! - Exactly one open under concurrent first use
//! - Name validation happens before anything touches disk
//! - A failed open leaves no entry behind, so a retry can succeed
//! - close_all closes and forgets every handle

#[path = "../common/mod.rs"]
mod common;

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use common::{open_count, test_config, TestEngine};
use tenantkv::protocol::StatusCode;
use tenantkv::{DbManager, LsmEngine, TenantError};

// =============================================================================
// Resolution Tests
// =============================================================================

#[test]
fn test_same_name_returns_same_handle() {
    let (_temp, config) = test_config();
    let manager = DbManager::<LsmEngine>::new(&config);

    let first = manager.resolve("users").unwrap();
    let second = manager.resolve("users").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.len(), 1);
}

#[test]
fn test_distinct_names_get_distinct_handles() {
    let (temp, config) = test_config();
    let manager = DbManager::<LsmEngine>::new(&config);

    let users = manager.resolve("users").unwrap();
    let orders = manager.resolve("orders").unwrap();

    assert!(!Arc::ptr_eq(&users, &orders));
    assert_eq!(users.path(), temp.path().join("users"));
    assert_eq!(orders.path(), temp.path().join("orders"));
    assert!(temp.path().join("users").is_dir());
    assert!(temp.path().join("orders").is_dir());
    assert_eq!(manager.databases(), vec!["orders", "users"]);
}

#[test]
fn test_databases_are_isolated() {
    let (_temp, config) = test_config();
    let manager = DbManager::<LsmEngine>::new(&config);

    manager.resolve("a").unwrap().put(b"k", b"from-a").unwrap();
    manager.resolve("b").unwrap().put(b"k", b"from-b").unwrap();

    assert_eq!(manager.resolve("a").unwrap().get(b"k").unwrap(), Some(b"from-a".to_vec()));
    assert_eq!(manager.resolve("b").unwrap().get(b"k").unwrap(), Some(b"from-b".to_vec()));
    assert_eq!(manager.resolve("c").unwrap().get(b"k").unwrap(), None);
}

#[test]
fn test_concurrent_first_use_opens_once() {
    let (temp, config) = test_config();
    let manager = Arc::new(DbManager::<TestEngine>::new(&config));
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.resolve("same").unwrap()
            })
        })
        .collect();

    let dbs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for db in &dbs[1..] {
        assert!(Arc::ptr_eq(&dbs[0], db));
    }
    assert_eq!(open_count(&temp.path().join("same")), 1);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_empty_name_rejected_without_side_effects() {
    let (temp, config) = test_config();
    let manager = DbManager::<TestEngine>::new(&config);

    let err = manager.resolve("").unwrap_err();

    assert!(matches!(err, TenantError::Validation(_)));
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    assert!(manager.is_empty());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn test_path_like_names_rejected() {
    let (temp, config) = test_config();
    let manager = DbManager::<LsmEngine>::new(&config);

    for name in ["..", ".", "a/b", "../escape", "a\\b"] {
        let err = manager.resolve(name).unwrap_err();
        assert!(matches!(err, TenantError::Validation(_)), "{:?} accepted", name);
    }
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn test_open_failure_reports_storage_open() {
    let (temp, _) = test_config();
    // base_dir is a regular file, so no database directory can be created
    let blocker = temp.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();
    let config = tenantkv::Config::builder().base_dir(&blocker).build();
    let manager = DbManager::<LsmEngine>::new(&config);

    let err = manager.resolve("users").unwrap_err();

    assert!(matches!(err, TenantError::StorageOpen { .. }));
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    assert!(manager.is_empty());
}

#[test]
fn test_failed_open_can_be_retried() {
    let (temp, _) = test_config();
    let blocker = temp.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();
    let config = tenantkv::Config::builder().base_dir(&blocker).build();
    let manager = DbManager::<TestEngine>::new(&config);
    let path = blocker.join("users");

    assert!(manager.resolve("users").is_err());
    assert!(manager.is_empty());
    assert_eq!(open_count(&path), 1);

    // Once the blocker is gone the same name opens normally
    fs::remove_file(&blocker).unwrap();
    let db = manager.resolve("users").unwrap();
    db.put(b"k", b"v").unwrap();
    assert_eq!(open_count(&path), 2);

    let again = manager.resolve("users").unwrap();
    assert!(Arc::ptr_eq(&db, &again));
    assert_eq!(open_count(&path), 2);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_all_closes_every_handle() {
    let (_temp, config) = test_config();
    let manager = DbManager::<LsmEngine>::new(&config);

    let a = manager.resolve("a").unwrap();
    let b = manager.resolve("b").unwrap();
    a.put(b"k", b"v").unwrap();

    assert_eq!(manager.close_all(), 2);
    assert!(a.is_closed());
    assert!(b.is_closed());
    assert!(manager.is_empty());
    assert!(matches!(a.get(b"k"), Err(TenantError::Closed)));

    // Idempotent
    assert_eq!(manager.close_all(), 0);
}

#[test]
fn test_data_survives_close_and_reopen() {
    let (_temp, config) = test_config();
    let manager = DbManager::<LsmEngine>::new(&config);

    let db = manager.resolve("persist").unwrap();
    db.put(b"key", b"value").unwrap();
    manager.close_all();

    let reopened = manager.resolve("persist").unwrap();
    assert!(!Arc::ptr_eq(&db, &reopened));
    assert_eq!(reopened.get(b"key").unwrap(), Some(b"value".to_vec()));
}
