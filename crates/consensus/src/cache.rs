//! Bounded concurrent caches.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// A fixed-capacity LRU map shared between verification workers.
///
/// Values are cloned out on read, so callers store cheap handles
/// (`Arc<Snapshot>`, `Address`) rather than large values.
pub struct RecentCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> RecentCache<K, V> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Looks up a value and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// Whether `key` is cached, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    /// Inserts a value, evicting the least recently used entry when full.
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    /// Removes an entry.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq, V: Clone> std::fmt::Debug for RecentCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecentCache")
            .field("len", &self.len())
            .finish()
    }
}
