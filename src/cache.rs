//! Bounded LRU maps for dimension surrogate ids.
//!
//! Three independent caches keep the hot vendor/address/network-name keys out
//! of the store's cold select-or-insert path. Every read and write is an
//! access that refreshes recency; exceeding capacity evicts the single
//! least-recently-accessed entry.
//!
//! Invariant: an entry is only inserted after the corresponding dimension row
//! exists — the cache must never vouch for an id the store does not hold.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Capacity of each dimension cache.
pub const DIMENSION_CACHE_CAPACITY: usize = 128;

/// Bounded map with least-recently-used eviction.
///
/// Recency is a monotonic access tick per entry; eviction scans for the
/// minimum tick. Linear in capacity, which is fixed and small.
#[derive(Debug)]
pub struct LruMap<K, V> {
    entries: HashMap<K, (V, u64)>,
    tick: u64,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> LruMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.max(1)),
            tick: 0,
            capacity: capacity.max(1),
        }
    }

    /// Look up a key, refreshing its recency on hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|entry| {
            entry.1 = tick;
            &entry.0
        })
    }

    /// Insert or overwrite a key, refreshing its recency. At capacity, the
    /// least-recently-accessed entry is evicted first.
    pub fn insert(&mut self, key: K, value: V) {
        self.tick += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(key, (value, self.tick));
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (_, tick))| *tick)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three dimension caches, natural key → surrogate id.
#[derive(Debug)]
pub struct DimensionCache {
    pub vendors: LruMap<String, i64>,
    pub addresses: LruMap<String, i64>,
    pub names: LruMap<String, i64>,
}

impl DimensionCache {
    pub fn new() -> Self {
        Self {
            vendors: LruMap::new(DIMENSION_CACHE_CAPACITY),
            addresses: LruMap::new(DIMENSION_CACHE_CAPACITY),
            names: LruMap::new(DIMENSION_CACHE_CAPACITY),
        }
    }
}

impl Default for DimensionCache {
    fn default() -> Self {
        Self::new()
    }
}
