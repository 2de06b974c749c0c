//! Storage Module
//!
//! The narrow interface the engine consumes from its backing stores, plus
//! the in-process memory tier.
//!
//! Concrete byte stores (session, local, durable, cookie) live outside this
//! crate; they only need to implement [`StorageBackend`] and, if they can
//! do multi-key I/O in one round trip, [`BatchCapability`].

mod memory;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStore;

// == Store Ids ==
/// In-process primary tier; target of read-through promotion.
pub const MEMORY: &str = "memory";
pub const SESSION: &str = "session";
pub const LOCAL: &str = "local";
pub const DURABLE: &str = "durable";
pub const COOKIE: &str = "cookie";

/// Probe and fallback order, fastest and most volatile tier first.
pub const PREFERENCE_ORDER: [&str; 5] = [MEMORY, SESSION, LOCAL, DURABLE, COOKIE];

/// Position of `id` in [`PREFERENCE_ORDER`]; unknown ids sort last.
pub fn preference_rank(id: &str) -> usize {
    PREFERENCE_ORDER
        .iter()
        .position(|known| *known == id)
        .unwrap_or(PREFERENCE_ORDER.len())
}

/// One item of a batch write: key, bytes and optional TTL in milliseconds.
pub type BatchWrite = (String, Vec<u8>, Option<u64>);

// == Storage Backend ==
/// A key/value byte store the engine can route entries to.
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    fn id(&self) -> &str;

    /// Whether the store can currently take reads and writes.
    fn is_available(&self) -> bool;

    fn used_size_bytes(&self) -> u64;

    async fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set_item(&self, key: &str, value: Vec<u8>, ttl_ms: Option<u64>) -> Result<()>;

    async fn remove_item(&self, key: &str) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;

    async fn clear(&self) -> Result<()>;

    async fn length(&self) -> Result<usize>;

    /// Purges expired items, returning how many were removed.
    async fn cleanup(&self) -> Result<usize>;

    /// Multi-key I/O, if the store supports it.
    fn batch(&self) -> Option<&dyn BatchCapability> {
        None
    }
}

// == Batch Capability ==
/// Optional multi-key operations of a store.
#[async_trait]
pub trait BatchCapability: Send + Sync {
    /// One slot per requested key, in request order.
    async fn batch_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// One flag per item, in request order; `false` marks a rejected item.
    async fn batch_set(&self, items: Vec<BatchWrite>) -> Result<Vec<bool>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_rank() {
        assert_eq!(preference_rank(MEMORY), 0);
        assert_eq!(preference_rank(COOKIE), 4);
        assert_eq!(preference_rank("custom"), PREFERENCE_ORDER.len());
        assert!(preference_rank(SESSION) < preference_rank(DURABLE));
    }
}
