//! Lookup cache
//!
//! Bounded memoization layer in front of the rule stores. Entries never
//! expire; they are evicted by size or dropped wholesale by
//! [`LookupCache::invalidate_all`] whenever the backing store changes.
//!
//! The cache is synchronised internally and is *not* covered by
//! the owning store's lock. A resolution that started before a mutation can
//! therefore insert its (now stale) verdict after the mutation has
//! invalidated the cache. That entry survives until the next invalidation or
//! eviction.

use moka::sync::Cache;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    /// Number of lookups served from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that fell through to the store
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of invalidate-all calls
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

/// Size-bounded, invalidate-on-write cache of resolved statuses
pub struct LookupCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    entries: Cache<K, V>,
    stats: CacheStats,
}

impl<K, V> LookupCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` entries
    pub fn new(name: &'static str, capacity: u64) -> Self {
        Self {
            name,
            entries: Cache::builder().max_capacity(capacity).build(),
            stats: CacheStats::default(),
        }
    }

    /// Get a cached verdict
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.entries.get(key);
        if value.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Memoize a verdict
    pub fn put(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(cache = self.name, "lookup cache invalidated");
    }

    /// Approximate number of live entries
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// True when no entries are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K, V> std::fmt::Debug for LookupCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("name", &self.name)
            .field("entries", &self.entries.entry_count())
            .field("stats", &self.stats)
            .finish()
    }
}
