//! FIFO Strategy Module
//!
//! Insertion-ordered queue. Reads never change the order; re-adding a key
//! sends it to the back as a fresh insertion.

use std::collections::HashMap;

use crate::cache::SlotList;

#[derive(Debug, Default)]
pub struct FifoStrategy {
    index: HashMap<String, usize>,
    /// Front = oldest insertion
    queue: SlotList<String>,
}

impl FifoStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&idx) => self.queue.move_to_back(idx),
            None => {
                let idx = self.queue.push_back(key.to_string());
                self.index.insert(key.to_string(), idx);
            }
        }
    }

    pub fn eviction_key(&self) -> Option<String> {
        self.queue.front().cloned()
    }

    pub fn remove_key(&mut self, key: &str) {
        if let Some(idx) = self.index.remove(key) {
            self.queue.remove(idx);
        }
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }
}
