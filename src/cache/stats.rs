//! Cache Statistics Module
//!
//! Tracks per-store performance counters: hits, misses, writes, removals,
//! expirations and I/O errors.

use serde::{Deserialize, Serialize};

// == Cache Stats ==
/// Performance counters for one backing store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of reads served by this store
    pub hits: u64,
    /// Number of reads this store could not serve
    pub misses: u64,
    /// Number of successful writes
    pub sets: u64,
    /// Number of removals issued against this store
    pub removes: u64,
    /// Number of entries found expired and purged on read
    pub expirations: u64,
    /// Number of values copied into this store by read-through promotion
    pub promotions: u64,
    /// Number of failed I/O calls
    pub errors: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
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

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_remove(&mut self) {
        self.removes += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_promotion(&mut self) {
        self.promotions += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    // == Merge ==
    /// Adds another set of counters into this one.
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.sets += other.sets;
        self.removes += other.removes;
        self.expirations += other.expirations;
        self.promotions += other.promotions;
        self.errors += other.errors;
    }
}
