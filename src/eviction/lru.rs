//! LRU Strategy Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::HashMap;

use crate::cache::SlotList;

// == LRU Strategy ==
/// Tracks access order for LRU eviction.
///
/// Keys live in a [`SlotList`] where:
/// - Front = Most recently used
/// - Back = Least recently used
///
/// Every operation is O(1).
#[derive(Debug, Default)]
pub struct LruStrategy {
    /// Key -> list handle
    index: HashMap<String, usize>,
    /// Order of keys by access time
    order: SlotList<String>,
}

impl LruStrategy {
    // == Constructor ==
    /// Creates a new empty LRU strategy.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Access ==
    /// Marks a tracked key as recently used (moves to front).
    ///
    /// Unknown keys are ignored.
    pub fn record_access(&mut self, key: &str) {
        if let Some(&idx) = self.index.get(key) {
            self.order.move_to_front(idx);
        }
    }

    // == Record Add ==
    /// Registers a key, or refreshes it if already tracked.
    pub fn record_add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&idx) => self.order.move_to_front(idx),
            None => {
                let idx = self.order.push_front(key.to_string());
                self.index.insert(key.to_string(), idx);
            }
        }
    }

    // == Eviction Key ==
    /// Returns the least recently used key without removing it.
    pub fn eviction_key(&self) -> Option<String> {
        self.order.back().cloned()
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub fn remove_key(&mut self, key: &str) {
        if let Some(idx) = self.index.remove(key) {
            self.order.remove(idx);
        }
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }
}
