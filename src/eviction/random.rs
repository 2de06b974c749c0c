//! Random Strategy Module
//!
//! Uniformly samples one tracked key per eviction query. Membership is a
//! dense key vector plus a key -> position index, so removal is an O(1)
//! swap-remove.

use std::collections::HashMap;

use super::rng::{RandomSource, XorShift64};

#[derive(Debug)]
pub struct RandomStrategy {
    keys: Vec<String>,
    positions: HashMap<String, usize>,
    rng: Box<dyn RandomSource>,
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self::with_rng(Box::new(XorShift64::from_clock()))
    }

    /// Creates a strategy drawing from the supplied source.
    pub fn with_rng(rng: Box<dyn RandomSource>) -> Self {
        Self {
            keys: Vec::new(),
            positions: HashMap::new(),
            rng,
        }
    }

    pub fn record_add(&mut self, key: &str) {
        if self.positions.contains_key(key) {
            return;
        }
        self.positions.insert(key.to_string(), self.keys.len());
        self.keys.push(key.to_string());
    }

    /// Draws a candidate; only the generator state advances.
    pub fn eviction_key(&mut self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = self.rng.next_index(self.keys.len());
        self.keys.get(idx).cloned()
    }

    pub fn remove_key(&mut self, key: &str) {
        let Some(idx) = self.positions.remove(key) else {
            return;
        };
        self.keys.swap_remove(idx);
        if let Some(moved) = self.keys.get(idx) {
            self.positions.insert(moved.clone(), idx);
        }
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.positions.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::rng::ScriptedSource;
    use std::collections::HashSet;

    #[test]
    fn test_candidate_is_always_tracked() {
        let mut random = RandomStrategy::with_rng(Box::new(XorShift64::new(99)));
        for key in ["a", "b", "c", "d"] {
            random.record_add(key);
        }
        random.remove_key("b");

        for _ in 0..200 {
            let key = random.eviction_key().unwrap();
            assert!(random.contains(&key));
            assert_ne!(key, "b");
        }
    }

    #[test]
    fn test_scripted_draws_pick_positions() {
        let mut random = RandomStrategy::with_rng(Box::new(ScriptedSource::new(vec![0.0, 0.99])));
        random.record_add("a");
        random.record_add("b");
        random.record_add("c");

        assert_eq!(random.eviction_key(), Some("a".to_string()));
        assert_eq!(random.eviction_key(), Some("c".to_string()));
    }

    #[test]
    fn test_every_key_is_eventually_drawn() {
        let mut random = RandomStrategy::with_rng(Box::new(XorShift64::new(3)));
        for key in ["a", "b", "c"] {
            random.record_add(key);
        }
        let seen: HashSet<String> = (0..300).filter_map(|_| random.eviction_key()).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_swap_remove_keeps_positions() {
        let mut random = RandomStrategy::new();
        for key in ["a", "b", "c"] {
            random.record_add(key);
        }
        random.remove_key("a");
        random.remove_key("c");
        assert_eq!(random.len(), 1);
        assert_eq!(random.eviction_key(), Some("b".to_string()));
        random.record_add("b");
        assert_eq!(random.len(), 1);
    }
}
