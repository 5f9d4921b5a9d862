//! In-memory key-value store.

use crate::{KeyValueStore, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A `HashMap` behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDatabase {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Keys starting with `prefix`, in no particular order.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.inner
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl KeyValueStore for MemoryDatabase {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }
}
