//! TTL-Priority Strategy Module
//!
//! Evicts by expiry: an already-expired key first, otherwise the key that
//! expires soonest. Only keys added with a TTL are tracked; keys without
//! one are invisible to this policy.

use std::collections::{BTreeSet, HashMap};

use crate::cache::current_timestamp_ms;

#[derive(Debug, Default)]
pub struct TtlStrategy {
    expiries: HashMap<String, u64>,
    /// (expires_at, key), soonest first
    by_expiry: BTreeSet<(u64, String)>,
}

impl TtlStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `key` until `now + ttl_ms`, saturating at `u64::MAX`.
    ///
    /// Re-adding without a TTL drops the key: it no longer expires.
    pub fn record_add(&mut self, key: &str, ttl_ms: Option<u64>) {
        self.remove_key(key);
        if let Some(ttl) = ttl_ms {
            let expires_at = current_timestamp_ms().saturating_add(ttl);
            self.expiries.insert(key.to_string(), expires_at);
            self.by_expiry.insert((expires_at, key.to_string()));
        }
    }

    /// Soonest expiry first. Since expiries are ordered, any key already
    /// past its deadline sorts ahead of every live one.
    pub fn eviction_key(&self) -> Option<String> {
        self.by_expiry.first().map(|(_, key)| key.clone())
    }

    /// Tracked keys whose expiry has passed at `now`.
    pub fn expired_keys(&self, now: u64) -> Vec<String> {
        self.by_expiry
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= now)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn remove_key(&mut self, key: &str) {
        if let Some(expires_at) = self.expiries.remove(key) {
            self.by_expiry.remove(&(expires_at, key.to_string()));
        }
    }

    pub fn clear(&mut self) {
        self.expiries.clear();
        self.by_expiry.clear();
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.expiries.contains_key(key)
    }

    pub fn expires_at(&self, key: &str) -> Option<u64> {
        self.expiries.get(key).copied()
    }
}
