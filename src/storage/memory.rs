//! Memory Store Module
//!
//! In-process bounded tier: a HashMap of raw entries with per-item TTL and
//! an eviction policy that picks the victim once capacity is reached.
//! Map and policy share one mutex, so a victim's removal from both is a
//! single critical section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{BatchCapability, BatchWrite, StorageBackend, MEMORY};
use crate::cache::current_timestamp_ms;
use crate::error::{CacheError, Result};
use crate::eviction::{EvictionStrategy, StrategyKind, StrategyRegistry, StrategyStats};

// == Stored Item ==
#[derive(Debug)]
struct StoredItem {
    bytes: Vec<u8>,
    expires_at: Option<u64>,
}

impl StoredItem {
    fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }
}

#[derive(Debug)]
struct MemoryInner {
    items: HashMap<String, StoredItem>,
    strategy: EvictionStrategy,
    used_bytes: u64,
    evictions: u64,
}

impl MemoryInner {
    fn take(&mut self, key: &str) -> Option<StoredItem> {
        let item = self.items.remove(key)?;
        self.strategy.remove_key(key);
        self.used_bytes = self.used_bytes.saturating_sub(item.bytes.len() as u64);
        Some(item)
    }

    fn read(&mut self, key: &str, now: u64) -> Option<Vec<u8>> {
        let expired = self.items.get(key)?.is_expired_at(now);
        if expired {
            self.take(key);
            return None;
        }
        self.strategy.record_access(key);
        self.items.get(key).map(|item| item.bytes.clone())
    }

    fn write(
        &mut self,
        store_id: &str,
        capacity: usize,
        key: &str,
        bytes: Vec<u8>,
        ttl_ms: Option<u64>,
    ) -> Result<()> {
        let now = current_timestamp_ms();

        // Evict until there is room for a new key
        if !self.items.contains_key(key) {
            while self.items.len() >= capacity {
                let Some(victim) = self.strategy.eviction_key() else {
                    return Err(CacheError::CacheFull(format!(
                        "store '{}' holds {} entries and its {} policy has no eviction candidate",
                        store_id,
                        self.items.len(),
                        self.strategy.kind()
                    )));
                };
                if self.take(&victim).is_some() {
                    self.evictions += 1;
                    debug!("Store '{}' evicted '{}'", store_id, victim);
                } else {
                    self.strategy.remove_key(&victim);
                }
            }
        }

        let item = StoredItem {
            expires_at: ttl_ms.map(|ttl| now.saturating_add(ttl)),
            bytes,
        };
        let added = item.bytes.len() as u64;
        if let Some(old) = self.items.insert(key.to_string(), item) {
            self.used_bytes = self.used_bytes.saturating_sub(old.bytes.len() as u64);
        }
        self.used_bytes += added;
        self.strategy.record_add(key, ttl_ms);
        Ok(())
    }
}

// == Memory Store ==
/// Bounded in-process store driven by an [`EvictionStrategy`].
#[derive(Debug)]
pub struct MemoryStore {
    id: String,
    capacity: usize,
    available: AtomicBool,
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates the primary `memory` tier with LRU eviction.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries the tier can hold
    pub fn new(capacity: usize) -> Self {
        Self::with_strategy(MEMORY, capacity, EvictionStrategy::new(StrategyKind::Lru))
    }

    /// Creates a store with an explicit id and strategy instance.
    pub fn with_strategy(id: impl Into<String>, capacity: usize, strategy: EvictionStrategy) -> Self {
        Self {
            id: id.into(),
            capacity: capacity.max(1),
            available: AtomicBool::new(true),
            inner: Mutex::new(MemoryInner {
                items: HashMap::new(),
                strategy,
                used_bytes: 0,
                evictions: 0,
            }),
        }
    }

    /// Creates a store whose strategy is looked up in the registry by name.
    pub fn with_policy(id: impl Into<String>, capacity: usize, policy: &str) -> Result<Self> {
        let strategy = StrategyRegistry::create(policy)?;
        Ok(Self::with_strategy(id, capacity, strategy))
    }

    /// Marks the store as (un)available; unavailable stores refuse I/O.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of capacity evictions so far.
    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }

    pub fn strategy_stats(&self) -> StrategyStats {
        self.inner.lock().strategy.stats()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(CacheError::store_io(&self.id, "store unavailable"))
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn used_size_bytes(&self) -> u64 {
        self.inner.lock().used_bytes
    }

    async fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_available()?;
        Ok(self.inner.lock().read(key, current_timestamp_ms()))
    }

    async fn set_item(&self, key: &str, value: Vec<u8>, ttl_ms: Option<u64>) -> Result<()> {
        self.ensure_available()?;
        self.inner
            .lock()
            .write(&self.id, self.capacity, key, value, ttl_ms)
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.inner.lock().take(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.ensure_available()?;
        let now = current_timestamp_ms();
        let inner = self.inner.lock();
        Ok(inner
            .items
            .iter()
            .filter(|(_, item)| !item.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_available()?;
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.strategy.clear();
        inner.used_bytes = 0;
        Ok(())
    }

    async fn length(&self) -> Result<usize> {
        self.ensure_available()?;
        Ok(self.inner.lock().items.len())
    }

    async fn cleanup(&self) -> Result<usize> {
        self.ensure_available()?;
        let now = current_timestamp_ms();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .items
            .iter()
            .filter(|(_, item)| item.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.take(key);
        }
        Ok(expired.len())
    }

    fn batch(&self) -> Option<&dyn BatchCapability> {
        Some(self)
    }
}

#[async_trait]
impl BatchCapability for MemoryStore {
    async fn batch_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.ensure_available()?;
        let now = current_timestamp_ms();
        let mut inner = self.inner.lock();
        Ok(keys.iter().map(|key| inner.read(key, now)).collect())
    }

    async fn batch_set(&self, items: Vec<BatchWrite>) -> Result<Vec<bool>> {
        self.ensure_available()?;
        let mut inner = self.inner.lock();
        Ok(items
            .into_iter()
            .map(|(key, bytes, ttl_ms)| {
                inner
                    .write(&self.id, self.capacity, &key, bytes, ttl_ms)
                    .is_ok()
            })
            .collect())
    }
}
