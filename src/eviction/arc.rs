//! ARC (Adaptive) Strategy Module
//!
//! Composes an LRU and an LFU strategy and a weight in `[0, 1]`: the
//! probability that an eviction query is answered by LRU rather than LFU.
//!
//! Accesses count as hits, adds count as misses. Once `window` events have
//! accumulated the hit rate moves the weight by one `step`:
//! - hit rate above `high_hit_rate`: towards LFU (weight decreases)
//! - hit rate below `low_hit_rate`: towards LRU (weight increases)
//!
//! The weight is clamped to `[min_weight, max_weight]` and the counters
//! reset after each adjustment. Eviction is intentionally random; inject a
//! [`RandomSource`] to make it reproducible.

use serde::{Deserialize, Serialize};

use super::lfu::LfuStrategy;
use super::lru::LruStrategy;
use super::rng::{RandomSource, XorShift64};

// == ARC Tuning ==
/// Weight adaptation constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcTuning {
    pub initial_weight: f64,
    /// Events between two weight adjustments
    pub window: u64,
    pub high_hit_rate: f64,
    pub low_hit_rate: f64,
    pub step: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for ArcTuning {
    fn default() -> Self {
        Self {
            initial_weight: 0.5,
            window: 100,
            high_hit_rate: 0.8,
            low_hit_rate: 0.5,
            step: 0.1,
            min_weight: 0.2,
            max_weight: 0.8,
        }
    }
}

// == ARC Strategy ==
#[derive(Debug)]
pub struct ArcStrategy {
    lru: LruStrategy,
    lfu: LfuStrategy,
    weight: f64,
    hits: u64,
    misses: u64,
    adjustments: u64,
    tuning: ArcTuning,
    rng: Box<dyn RandomSource>,
}

impl Default for ArcStrategy {
    fn default() -> Self {
        Self::new(ArcTuning::default())
    }
}

impl ArcStrategy {
    pub fn new(tuning: ArcTuning) -> Self {
        Self::with_rng(tuning, Box::new(XorShift64::from_clock()))
    }

    pub fn with_rng(tuning: ArcTuning, rng: Box<dyn RandomSource>) -> Self {
        let weight = tuning
            .initial_weight
            .clamp(tuning.min_weight, tuning.max_weight);
        Self {
            lru: LruStrategy::new(),
            lfu: LfuStrategy::new(),
            weight,
            hits: 0,
            misses: 0,
            adjustments: 0,
            tuning,
            rng,
        }
    }

    pub fn record_access(&mut self, key: &str) {
        self.hits += 1;
        self.lru.record_access(key);
        self.lfu.record_access(key);
        self.maybe_adapt();
    }

    pub fn record_add(&mut self, key: &str) {
        self.misses += 1;
        self.lru.record_add(key);
        self.lfu.record_add(key);
        self.maybe_adapt();
    }

    /// Delegates to LRU with probability `weight`, otherwise to LFU.
    pub fn eviction_key(&mut self) -> Option<String> {
        if self.lru.is_empty() {
            return None;
        }
        if self.rng.next_f64() < self.weight {
            self.lru.eviction_key()
        } else {
            self.lfu.eviction_key()
        }
    }

    pub fn remove_key(&mut self, key: &str) {
        self.lru.remove_key(key);
        self.lfu.remove_key(key);
    }

    pub fn clear(&mut self) {
        self.lru.clear();
        self.lfu.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lru.contains(key)
    }

    /// Current probability of consulting LRU.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn tuning(&self) -> &ArcTuning {
        &self.tuning
    }

    /// Number of weight adjustments made so far.
    pub fn adjustments(&self) -> u64 {
        self.adjustments
    }

    /// Hits and misses counted in the current window.
    pub fn window_counts(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn maybe_adapt(&mut self) {
        let total = self.hits + self.misses;
        if total < self.tuning.window.max(1) {
            return;
        }

        let hit_rate = self.hits as f64 / total as f64;
        if hit_rate > self.tuning.high_hit_rate {
            self.weight -= self.tuning.step;
        } else if hit_rate < self.tuning.low_hit_rate {
            self.weight += self.tuning.step;
        }
        self.weight = self
            .weight
            .clamp(self.tuning.min_weight, self.tuning.max_weight);

        self.hits = 0;
        self.misses = 0;
        self.adjustments += 1;
    }
}
