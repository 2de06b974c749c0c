//! Bounded Expiring Map Module
//!
//! An LRU-ordered map bounded by capacity with optional per-entry TTL.
//! The engine uses it for routing hints, the serialization cache and event
//! throttling; it also works as a standalone LRU+TTL cache.
//!
//! Recency order is kept in a [`SlotList`] (head = most recently used) with
//! a key index for O(1) `get`/`set`/`delete`. `cleanup` is a full O(n) scan.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::list::SlotList;

/// Callback fired with the entry pushed out by a capacity eviction.
pub type EvictionCallback<K, V> = Box<dyn FnMut(K, V) + Send>;

// == Map Node ==
#[derive(Debug)]
struct MapNode<K, V> {
    key: K,
    value: V,
    expires_at: Option<u64>,
}

impl<K, V> MapNode<K, V> {
    fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }
}

// == Bounded Expiring Map ==
/// Capacity-bounded LRU map with per-entry expiry.
pub struct BoundedExpiringMap<K, V> {
    index: HashMap<K, usize>,
    order: SlotList<MapNode<K, V>>,
    capacity: usize,
    default_ttl_ms: Option<u64>,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> fmt::Debug for BoundedExpiringMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedExpiringMap")
            .field("len", &self.order.len())
            .field("capacity", &self.capacity)
            .field("default_ttl_ms", &self.default_ttl_ms)
            .finish()
    }
}

impl<K, V> BoundedExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates a map holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::new(),
            order: SlotList::new(),
            capacity: capacity.max(1),
            default_ttl_ms: None,
            on_evict: None,
        }
    }

    /// Applies `ttl_ms` to every `set` that does not pass its own TTL.
    pub fn with_default_ttl(mut self, ttl_ms: u64) -> Self {
        self.default_ttl_ms = Some(ttl_ms);
        self
    }

    /// Registers a callback fired once per capacity eviction.
    pub fn with_eviction_callback(mut self, callback: impl FnMut(K, V) + Send + 'static) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    // == Get ==
    /// Returns the value and marks it most recently used.
    ///
    /// An expired entry is purged and reported as absent.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.live_index(key, current_timestamp_ms())?;
        self.order.move_to_front(idx);
        self.order.get(idx).map(|node| &node.value)
    }

    /// Returns the value without touching recency or purging.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        let node = self.order.get(idx)?;
        if node.is_expired_at(current_timestamp_ms()) {
            return None;
        }
        Some(&node.value)
    }

    // == Set ==
    /// Inserts or replaces a value.
    ///
    /// An existing key gets the new value and expiry and moves to the head.
    /// A new key is inserted at the head; if that pushes the map over
    /// capacity the tail is evicted and the eviction callback fires.
    ///
    /// # Arguments
    /// * `key` - Key to store
    /// * `value` - Value to store
    /// * `ttl_ms` - Optional TTL in milliseconds (falls back to the default TTL)
    pub fn set(&mut self, key: K, value: V, ttl_ms: Option<u64>) {
        let expires_at = ttl_ms
            .or(self.default_ttl_ms)
            .map(|ttl| current_timestamp_ms().saturating_add(ttl));

        if let Some(&idx) = self.index.get(&key) {
            if let Some(node) = self.order.get_mut(idx) {
                node.value = value;
                node.expires_at = expires_at;
            }
            self.order.move_to_front(idx);
            return;
        }

        let idx = self.order.push_front(MapNode {
            key: key.clone(),
            value,
            expires_at,
        });
        self.index.insert(key, idx);

        if self.order.len() > self.capacity {
            self.evict_tail();
        }
    }

    // == Delete ==
    /// Removes a key, returning its value if it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.index.remove(key)?;
        self.order.remove(idx).map(|node| node.value)
    }

    // == Has ==
    /// Expiration-aware membership test; purges the key if it has expired.
    pub fn has<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.live_index(key, current_timestamp_ms()).is_some()
    }

    // == Cleanup ==
    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = current_timestamp_ms();
        let mut expired = Vec::new();

        let mut cursor = self.order.front_index();
        while let Some(idx) = cursor {
            if let Some(node) = self.order.get(idx) {
                if node.is_expired_at(now) {
                    expired.push(idx);
                }
            }
            cursor = self.order.next_index(idx);
        }

        for idx in &expired {
            if let Some(node) = self.order.remove(*idx) {
                self.index.remove(&node.key);
            }
        }
        expired.len()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }

    // == Length ==
    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        self.order.iter().map(|node| node.key.clone()).collect()
    }

    /// Least recently used key, the next capacity eviction victim.
    pub fn lru_key(&self) -> Option<&K> {
        self.order.back().map(|node| &node.key)
    }

    // == Internals ==
    fn live_index<Q>(&mut self, key: &Q, now: u64) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        let expired = self.order.get(idx).map_or(true, |node| node.is_expired_at(now));
        if expired {
            self.index.remove(key);
            self.order.remove(idx);
            return None;
        }
        Some(idx)
    }

    fn evict_tail(&mut self) {
        if let Some(node) = self.order.pop_back() {
            self.index.remove(&node.key);
            if let Some(callback) = self.on_evict.as_mut() {
                callback(node.key, node.value);
            }
        }
    }
}
