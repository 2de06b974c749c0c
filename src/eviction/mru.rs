//! MRU Strategy Module
//!
//! Mirror of LRU: the most recently touched key is the eviction candidate.
//! Each touch stamps a monotonic counter; the candidate is the key holding
//! the highest stamp, which is always the head of the recency list.

use std::collections::HashMap;

use crate::cache::SlotList;

#[derive(Debug, Default)]
pub struct MruStrategy {
    /// Key -> (list handle, touch counter)
    index: HashMap<String, (usize, u64)>,
    /// Front = highest counter
    order: SlotList<String>,
    counter: u64,
}

impl MruStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_access(&mut self, key: &str) {
        if self.index.contains_key(key) {
            self.touch(key);
        }
    }

    pub fn record_add(&mut self, key: &str) {
        if self.index.contains_key(key) {
            self.touch(key);
            return;
        }
        self.counter += 1;
        let idx = self.order.push_front(key.to_string());
        self.index.insert(key.to_string(), (idx, self.counter));
    }

    pub fn eviction_key(&self) -> Option<String> {
        self.order.front().cloned()
    }

    pub fn remove_key(&mut self, key: &str) {
        if let Some((idx, _)) = self.index.remove(key) {
            self.order.remove(idx);
        }
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Counter value of the last touch of `key`.
    pub fn last_touch(&self, key: &str) -> Option<u64> {
        self.index.get(key).map(|(_, stamp)| *stamp)
    }

    fn touch(&mut self, key: &str) {
        self.counter += 1;
        if let Some((idx, stamp)) = self.index.get_mut(key) {
            *stamp = self.counter;
            self.order.move_to_front(*idx);
        }
    }
}
