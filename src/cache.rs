//! Parsed view caching.
//!
//! [`ViewCache`] maps the string form of a view (literal markup, or a logical
//! view name) to the template nodes it parsed into, so each distinct view is
//! loaded and parsed once per [`CompositionEngine`](crate::CompositionEngine).
//! Regions never receive the cached nodes themselves, only deep clones.
//!
//! The cache is unbounded by default and never evicts. A bounded capacity
//! turns it into an LRU backed by the [`lru`] crate.
//!
//! [`CacheStats`] tracks hits, misses and invalidations.
//!
//! # Examples
//!
//! ```
//! use compose_navigator::cache::ViewCache;
//! use compose_navigator::NodeId;
//!
//! let mut cache = ViewCache::new();
//! cache.insert("home".to_string(), vec![NodeId(1)]);
//!
//! assert_eq!(cache.get("home"), Some(vec![NodeId(1)]));
//! assert_eq!(cache.stats().hits, 1);
//! ```

use crate::dom::NodeId;
use crate::{debug_log, trace_log};
use lru::LruCache;
use std::num::NonZeroUsize;

/// Counters tracking cache hit/miss rates and invalidations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Lookups that had to load or parse.
    pub misses: usize,
    /// Full invalidations (via [`ViewCache::clear`]).
    pub invalidations: usize,
}

impl CacheStats {
    /// Hit rate as a value in `0.0..=1.0`; `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache of parsed view templates keyed by markup text or view name.
#[derive(Debug)]
pub struct ViewCache {
    entries: LruCache<String, Vec<NodeId>>,
    stats: CacheStats,
}

impl ViewCache {
    /// An unbounded cache.
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            stats: CacheStats::default(),
        }
    }

    /// A cache evicting the least recently used view beyond `capacity`
    /// entries. A zero capacity means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map_or_else(LruCache::unbounded, LruCache::new),
            stats: CacheStats::default(),
        }
    }

    /// Cached template nodes for `key`. Updates hit/miss stats.
    pub fn get(&mut self, key: &str) -> Option<Vec<NodeId>> {
        if let Some(nodes) = self.entries.get(key) {
            self.stats.hits += 1;
            trace_log!("View cache hit for '{}'", key);
            Some(nodes.clone())
        } else {
            self.stats.misses += 1;
            trace_log!("View cache miss for '{}'", key);
            None
        }
    }

    /// Store the template nodes parsed for `key`.
    pub fn insert(&mut self, key: String, nodes: Vec<NodeId>) {
        trace_log!("Caching {} node(s) for '{}'", nodes.len(), key);
        self.entries.push(key, nodes);
    }

    /// `true` if `key` is cached. Does not touch stats or recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Drop every entry and increment the invalidation counter.
    pub fn clear(&mut self) {
        let len = self.entries.len();
        self.entries.clear();
        self.stats.invalidations += 1;
        debug_log!(
            "View cache cleared: {} entries removed ({} total invalidations, hit rate: {:.1}%)",
            len,
            self.stats.invalidations,
            self.stats.hit_rate() * 100.0
        );
    }

    /// Current statistics.
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Reset all counters to zero.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Number of cached views.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new()
    }
}
