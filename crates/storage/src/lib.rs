//! dposcore Storage Layer
//!
//! The consensus engine only needs a byte store with get/put semantics to
//! persist checkpoint snapshots. This crate provides:
//!
//! - **[`KeyValueStore`]**: the get/put capability the engine consumes
//! - **[`MemoryDatabase`]**: an in-process store for tests and light embeddings
//! - **`Database`**: a RocksDB wrapper storing consensus records in a dedicated
//!   column family (feature `rocksdb`)

#![deny(missing_docs)]
#![deny(unsafe_code)]

#[cfg(feature = "rocksdb")]
pub mod db;
pub mod memory;

#[cfg(feature = "rocksdb")]
pub use db::{Database, DatabaseConfig};
pub use memory::MemoryDatabase;

use std::sync::Arc;
use thiserror::Error;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend failure
    #[error("Database error: {0}")]
    Database(String),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// A persistent byte store keyed by opaque byte strings.
///
/// Implementations must be safe to share between verification workers.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value, `None` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes a value, replacing any previous one.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Whether a key is present.
    fn contains(&self, key: &[u8]) -> Result<bool> {
        self.get(key).map(|v| v.is_some())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }
}
