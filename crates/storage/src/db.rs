//! RocksDB-backed store.
//!
//! Consensus records live in their own column family so the store can sit
//! next to a host node's block and state data in one RocksDB instance.

use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{KeyValueStore, Result, StorageError};

/// Column family names
pub mod cf {
    /// Consensus snapshots and engine metadata
    pub const CONSENSUS: &str = "consensus";
    /// Free-form metadata
    pub const METADATA: &str = "metadata";

    /// All column families
    pub const ALL: &[&str] = &[CONSENSUS, METADATA];
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database directory
    pub path: String,
    /// Enable LZ4 compression
    pub enable_compression: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::from("./data/dposcore"),
            enable_compression: true,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

/// RocksDB wrapper exposing the consensus column family as a [`KeyValueStore`].
pub struct Database {
    inner: DBWithThreadMode<MultiThreaded>,
    config: DatabaseConfig,
    write_lock: RwLock<()>,
}

impl Database {
    /// Open or create a database.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        info!(path = %config.path, "Opening consensus database");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = cf::ALL
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &opts,
            Path::new(&config.path),
            cf_descriptors,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(Self {
            inner: db,
            config,
            write_lock: RwLock::new(()),
        })
    }

    /// Open with default tuning at `path`.
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(DatabaseConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.inner
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Get a value from a column family
    pub fn get_cf(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(cf_name)?;
        self.inner
            .get_cf(&cf, key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Put a value into a column family
    pub fn put_cf(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        let _guard = self.write_lock.write();
        self.inner
            .put_cf(&cf, key, value)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Delete a value from a column family
    pub fn delete_cf(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        let _guard = self.write_lock.write();
        self.inner
            .delete_cf(&cf, key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Path of the database directory
    pub fn path(&self) -> &str {
        &self.config.path
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_cf(cf::CONSENSUS, key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_cf(cf::CONSENSUS, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.delete_cf(cf::CONSENSUS, key)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        debug!(path = %self.config.path, "Closing consensus database");
    }
}
