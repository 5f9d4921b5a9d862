//! Integration tests for the RocksDB-backed store

#![cfg(feature = "rocksdb")]

use dposcore_storage::db::cf;
use dposcore_storage::{Database, KeyValueStore};
use tempfile::TempDir;

fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open_default(temp_dir.path()).unwrap();
    (db, temp_dir)
}

#[test]
fn test_key_value_store_round_trip() {
    let (db, _temp_dir) = create_test_db();

    db.put(b"dpos-key", b"value1").unwrap();
    assert_eq!(db.get(b"dpos-key").unwrap(), Some(b"value1".to_vec()));

    db.delete(b"dpos-key").unwrap();
    assert_eq!(db.get(b"dpos-key").unwrap(), None);
}

#[test]
fn test_consensus_records_are_isolated_from_metadata() {
    let (db, _temp_dir) = create_test_db();

    db.put(b"shared", b"consensus").unwrap();
    db.put_cf(cf::METADATA, b"shared", b"metadata").unwrap();

    assert_eq!(db.get(b"shared").unwrap(), Some(b"consensus".to_vec()));
    assert_eq!(
        db.get_cf(cf::METADATA, b"shared").unwrap(),
        Some(b"metadata".to_vec())
    );
}

#[test]
fn test_reopen_persists() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open_default(temp_dir.path()).unwrap();
        db.put(b"k", b"v").unwrap();
    }
    let db = Database::open_default(temp_dir.path()).unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_unknown_column_family() {
    let (db, _temp_dir) = create_test_db();
    assert!(db.get_cf("blocks", b"k").is_err());
}
