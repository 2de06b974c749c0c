//! LFU Strategy Module
//!
//! Least Frequently Used tracking. Ties on frequency go to the key whose
//! last access is oldest.
//!
//! Instead of a linear scan, keys sit in an ordered index keyed by
//! `(frequency, last_access_tick)`, so the eviction candidate is the first
//! element and updates cost O(log n).

use std::collections::{BTreeSet, HashMap};

// == LFU Record ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LfuRecord {
    frequency: u64,
    tick: u64,
}

// == LFU Strategy ==
#[derive(Debug, Default)]
pub struct LfuStrategy {
    records: HashMap<String, LfuRecord>,
    ordered: BTreeSet<(u64, u64, String)>,
    /// Monotonic logical clock stamped on every touch
    clock: u64,
}

impl LfuStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the frequency of a tracked key. Unknown keys are ignored.
    pub fn record_access(&mut self, key: &str) {
        if self.records.contains_key(key) {
            self.bump(key);
        }
    }

    /// Registers a key with frequency 1; a tracked key counts as an access.
    pub fn record_add(&mut self, key: &str) {
        if self.records.contains_key(key) {
            self.bump(key);
            return;
        }
        let record = LfuRecord {
            frequency: 1,
            tick: self.next_tick(),
        };
        self.ordered
            .insert((record.frequency, record.tick, key.to_string()));
        self.records.insert(key.to_string(), record);
    }

    /// Lowest frequency, oldest access first.
    pub fn eviction_key(&self) -> Option<String> {
        self.ordered.first().map(|(_, _, key)| key.clone())
    }

    pub fn remove_key(&mut self, key: &str) {
        if let Some(record) = self.records.remove(key) {
            self.ordered
                .remove(&(record.frequency, record.tick, key.to_string()));
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.ordered.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Access count of a tracked key.
    pub fn frequency(&self, key: &str) -> Option<u64> {
        self.records.get(key).map(|record| record.frequency)
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn bump(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(record) = self.records.get_mut(key) {
            self.ordered
                .remove(&(record.frequency, record.tick, key.to_string()));
            record.frequency += 1;
            record.tick = tick;
            self.ordered
                .insert((record.frequency, record.tick, key.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_frequency_is_evicted() {
        let mut lfu = LfuStrategy::new();
        lfu.record_add("a");
        lfu.record_add("b");
        lfu.record_add("c");

        lfu.record_access("a");
        lfu.record_access("a");
        lfu.record_access("c");

        assert_eq!(lfu.eviction_key(), Some("b".to_string()));
        assert_eq!(lfu.frequency("a"), Some(3));
    }

    #[test]
    fn test_ties_break_on_oldest_access() {
        let mut lfu = LfuStrategy::new();
        lfu.record_add("a");
        lfu.record_add("b");

        lfu.record_access("a");
        lfu.record_access("b");

        // both at frequency 2, "a" touched first
        assert_eq!(lfu.eviction_key(), Some("a".to_string()));
    }

    #[test]
    fn test_readd_counts_as_access() {
        let mut lfu = LfuStrategy::new();
        lfu.record_add("a");
        lfu.record_add("b");
        lfu.record_add("a");

        assert_eq!(lfu.frequency("a"), Some(2));
        assert_eq!(lfu.eviction_key(), Some("b".to_string()));
    }

    #[test]
    fn test_remove_and_unknown_keys() {
        let mut lfu = LfuStrategy::new();
        lfu.record_add("a");
        lfu.record_access("ghost");
        lfu.remove_key("ghost");
        assert_eq!(lfu.len(), 1);

        lfu.remove_key("a");
        assert!(lfu.is_empty());
        assert_eq!(lfu.eviction_key(), None);
    }
}
