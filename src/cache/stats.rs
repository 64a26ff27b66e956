//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Cumulative counters plus live size bookkeeping.
///
/// `enabled` gates the cumulative counters only; entry and byte totals are
/// always maintained because capacity enforcement depends on them.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    pub sets: u64,
    /// Explicit deletes, including tag and pattern invalidation
    pub deletes: u64,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    pub current_size_bytes: usize,
    #[serde(skip)]
    enabled: bool,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new(enabled: bool) -> Self {
        Self {
            hits: 0,
            misses: 0,
            sets: 0,
            deletes: 0,
            evictions: 0,
            expirations: 0,
            total_entries: 0,
            current_size_bytes: 0,
            enabled,
        }
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate as a percentage.
    ///
    /// Returns hits / (hits + misses) * 100, or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }

    pub fn record_hit(&mut self) {
        if self.enabled {
            self.hits += 1;
        }
    }

    pub fn record_miss(&mut self) {
        if self.enabled {
            self.misses += 1;
        }
    }

    pub fn record_set(&mut self) {
        if self.enabled {
            self.sets += 1;
        }
    }

    pub fn record_delete(&mut self) {
        if self.enabled {
            self.deletes += 1;
        }
    }

    pub fn record_eviction(&mut self) {
        if self.enabled {
            self.evictions += 1;
        }
    }

    pub fn record_expiration(&mut self) {
        if self.enabled {
            self.expirations += 1;
        }
    }

    // == Live Size ==
    pub fn entry_added(&mut self, size_bytes: usize) {
        self.total_entries += 1;
        self.current_size_bytes = self.current_size_bytes.saturating_add(size_bytes);
    }

    pub fn entry_removed(&mut self, size_bytes: usize) {
        self.total_entries -= 1;
        self.current_size_bytes = self.current_size_bytes.saturating_sub(size_bytes);
    }

    /// Zeroes live totals after the store is emptied.
    pub fn reset_live(&mut self) {
        self.total_entries = 0;
        self.current_size_bytes = 0;
    }

    /// Zeroes cumulative counters, keeping live totals.
    pub fn reset_counters(&mut self) {
        *self = Self {
            total_entries: self.total_entries,
            current_size_bytes: self.current_size_bytes,
            ..Self::new(self.enabled)
        };
    }

    pub fn snapshot(&self, max_size_bytes: usize) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits,
            misses: self.misses,
            sets: self.sets,
            deletes: self.deletes,
            evictions: self.evictions,
            expirations: self.expirations,
            entries: self.total_entries,
            current_size_bytes: self.current_size_bytes,
            max_size_bytes,
            hit_rate: self.hit_rate(),
        }
    }
}

// == Cache Metrics ==
/// Point-in-time metrics snapshot returned by `metrics()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub current_size_bytes: usize,
    pub max_size_bytes: usize,
    /// Percentage in [0, 100]
    pub hit_rate: f64,
}
