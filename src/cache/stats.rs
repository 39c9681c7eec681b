//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and memory usage.

use serde::Serialize;

// == Memory Usage ==
/// Envelope bytes held against the configured budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryUsage {
    /// Bytes currently charged to stored entries
    pub used: usize,
    /// Configured budget in bytes
    pub limit: usize,
    /// `used / limit * 100`
    pub percentage: f64,
}

impl MemoryUsage {
    pub fn new(used: usize, limit: usize) -> Self {
        let percentage = if limit == 0 {
            0.0
        } else {
            used as f64 / limit as f64 * 100.0
        };
        Self {
            used,
            limit,
            percentage,
        }
    }
}

// == Cache Stats ==
/// Snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found, expired or unreadable)
    pub misses: u64,
    /// Number of entries evicted to stay within budget
    pub evictions: u64,
    /// Number of entries removed because their TTL lapsed
    pub expirations: u64,
    /// Number of entries purged after failing authentication
    pub integrity_failures: u64,
    /// Current number of entries in the cache
    pub entry_count: usize,
    /// Sum of all entries' `size_bytes`
    pub total_size_bytes: usize,
    /// `hits / (hits + misses)`
    pub hit_rate: f64,
    pub memory_usage: MemoryUsage,
    /// Generation of the key sealing new entries
    pub key_version: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn compute_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_integrity_failure(&mut self) {
        self.integrity_failures += 1;
    }

    // == Snapshot ==
    /// Returns a copy with the derived fields filled in.
    pub fn snapshot(&self, limit_bytes: usize, key_version: u64) -> CacheStats {
        let mut stats = self.clone();
        stats.hit_rate = self.compute_hit_rate();
        stats.memory_usage = MemoryUsage::new(self.total_size_bytes, limit_bytes);
        stats.key_version = key_version;
        stats
    }
}
