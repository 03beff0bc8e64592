//! Time-to-live cache backed by `moka`.

use moka::sync::Cache;
use std::hash::Hash;
use std::time::Duration;

/// Upper bound on cached entries unless a capacity is given.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// A concurrent map whose entries expire after a time-to-live.
///
/// Expired entries are never returned. Clones share the same storage, so the
/// cache can be handed to worker threads without extra locking.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    inner: Cache<K, V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding up to [`DEFAULT_MAX_ENTRIES`] entries.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with an explicit entry limit.
    pub fn with_capacity(ttl: Duration, max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    /// Insert a value, replacing any previous entry and restarting its TTL.
    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    /// Fetch a live value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    /// Remove an entry, returning its value if it was still live.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Approximate number of entries; exact after [`TtlCache::sweep`].
    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    /// Evict expired entries and flush pending bookkeeping.
    pub fn sweep(&self) {
        self.inner.run_pending_tasks();
    }
}
