//! Cache Engine
//!
//! Orchestrates a set of backing stores: picks where a write goes, stamps
//! entries with metadata, probes stores on reads, promotes hits from slower
//! tiers into memory and keeps per-store statistics.
//!
//! Per key the state is implicit in store contents:
//! absent -> present(fresh) -> present(stale, not yet purged) -> absent.
//! Stale entries are purged lazily by the read that observes them, or by
//! [`CacheEngine::purge_expired`].

mod events;
mod keys;
mod multi;
mod select;
mod serializer;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::{BoundedExpiringMap, CacheEntry, CacheStats, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::config::EngineConfig;
use crate::error::{CacheError, Result};
use crate::eviction::StrategyRegistry;
use crate::pipeline::BatchPipeline;
use crate::storage::{preference_rank, MemoryStore, StorageBackend, MEMORY};

pub use events::{CacheEvent, EventEmitter, EventKind};
pub use keys::{KeyObfuscator, KeyTransformer};
pub use multi::MultiOutcome;
pub use select::{
    SelectionContext, SelectionPolicy, SelectionPolicyKind, SizeTieredPolicy, TtlTieredPolicy,
};
pub use serializer::{Encoded, Serializer, ValueCipher, CIRCULAR_SENTINEL, MAX_DEPTH};

type SharedStats = Arc<Mutex<HashMap<String, CacheStats>>>;
type SharedRoutes = Arc<Mutex<BoundedExpiringMap<String, String>>>;

// == Operation Options ==
/// Per-write overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOptions {
    /// Overrides the configured default TTL
    pub ttl_ms: Option<u64>,
    /// Forces the write to this store
    pub store: Option<String>,
    /// Runs the value through the configured cipher
    pub encrypt: bool,
}

impl SetOptions {
    pub fn ttl(ttl_ms: u64) -> Self {
        Self {
            ttl_ms: Some(ttl_ms),
            ..Self::default()
        }
    }

    pub fn store(store: impl Into<String>) -> Self {
        Self {
            store: Some(store.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RememberOptions {
    /// Recompute even if a cached value exists
    pub force_refresh: bool,
    pub set: SetOptions,
}

// == Engine Stats ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub stores: BTreeMap<String, CacheStats>,
    pub total: CacheStats,
    pub hit_rate: f64,
    pub routing_hints: usize,
    pub serializer_cache: usize,
}

// == Engine Builder ==
/// Assembles a [`CacheEngine`].
///
/// Without an explicitly registered `memory` store the builder creates one
/// from `memory_capacity` and `eviction_policy`.
pub struct EngineBuilder {
    config: EngineConfig,
    stores: Vec<Arc<dyn StorageBackend>>,
    selection: Option<Box<dyn SelectionPolicy>>,
    obfuscator: Option<Arc<dyn KeyObfuscator>>,
    cipher: Option<Arc<dyn ValueCipher>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stores: Vec::new(),
            selection: None,
            obfuscator: None,
            cipher: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn StorageBackend>) -> Self {
        self.stores.push(store);
        self
    }

    /// Overrides the policy named in the selection config.
    pub fn selection_policy(mut self, policy: Box<dyn SelectionPolicy>) -> Self {
        self.selection = Some(policy);
        self
    }

    pub fn obfuscator(mut self, obfuscator: Arc<dyn KeyObfuscator>) -> Self {
        self.obfuscator = Some(obfuscator);
        self
    }

    pub fn cipher(mut self, cipher: Arc<dyn ValueCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn build(self) -> Result<CacheEngine> {
        let config = self.config;
        config.batch.validate()?;

        let mut stores = self.stores;
        let mut seen = HashSet::new();
        for store in &stores {
            if !seen.insert(store.id().to_string()) {
                return Err(CacheError::Validation(format!(
                    "Store '{}' registered twice",
                    store.id()
                )));
            }
        }

        if !seen.contains(MEMORY) {
            let strategy = StrategyRegistry::create_tuned(&config.eviction_policy, &config.arc)?;
            stores.push(Arc::new(MemoryStore::with_strategy(
                MEMORY,
                config.memory_capacity,
                strategy,
            )));
        }

        // stable: unknown ids keep registration order
        stores.sort_by_key(|store| preference_rank(store.id()));

        let selection = self.selection.or_else(|| {
            config
                .selection
                .enabled
                .then(|| config.selection.policy.build())
        });

        let stats = stores
            .iter()
            .map(|store| (store.id().to_string(), CacheStats::new()))
            .collect();

        let engine = CacheEngine {
            keys: KeyTransformer::new(config.key_prefix.clone(), self.obfuscator),
            serializer: Serializer::new(
                config.serializer_cache_capacity,
                config.serializer_cache_ttl_ms,
                config.serializer_max_cached_len,
            ),
            routes: Arc::new(Mutex::new(
                BoundedExpiringMap::new(config.routing_capacity)
                    .with_default_ttl(config.routing_ttl_ms),
            )),
            stats: Arc::new(Mutex::new(stats)),
            events: EventEmitter::new(config.event_throttle_ms),
            pipeline: BatchPipeline::new(config.batch.clone()),
            cipher: self.cipher,
            selection,
            stores,
            config,
        };

        info!(
            "Cache engine ready with stores [{}]",
            engine.store_ids().join(", ")
        );
        Ok(engine)
    }
}

// == Cache Engine ==
#[derive(Debug)]
pub struct CacheEngine {
    config: EngineConfig,
    /// Sorted by preference rank
    stores: Vec<Arc<dyn StorageBackend>>,
    keys: KeyTransformer,
    serializer: Serializer,
    cipher: Option<Arc<dyn ValueCipher>>,
    selection: Option<Box<dyn SelectionPolicy>>,
    /// Caller key -> id of the store that last held it; a hint only
    routes: SharedRoutes,
    stats: SharedStats,
    events: EventEmitter,
    pipeline: BatchPipeline,
}

impl CacheEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Engine with only the built-in memory tier.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &BatchPipeline {
        &self.pipeline
    }

    pub fn store_ids(&self) -> Vec<String> {
        self.stores.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn store(&self, id: &str) -> Option<&Arc<dyn StorageBackend>> {
        self.stores.iter().find(|s| s.id() == id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // == Set ==
    /// Serializes `value` and writes it to the selected store, then removes
    /// any older copy held by the other stores.
    ///
    /// Validation, selection and serialization errors are returned before
    /// any store is touched.
    pub async fn set<T>(&self, key: &str, value: &T, options: &SetOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;
        self.validate_options(options)?;

        let (store, entry) = self.prepare(key, value, options)?;
        let bytes = entry.to_bytes()?;

        let stored = store
            .set_item(&self.keys.to_store(key), bytes, entry.ttl_ms())
            .await;
        if let Err(err) = stored {
            self.record_store_error(store.id(), Some(key), &err);
            return Err(err);
        }

        self.supersede(store.id(), key).await;
        self.written(store.id(), key);
        debug!("Stored '{}' in '{}' ({} bytes)", key, store.id(), entry.size_bytes);
        Ok(())
    }

    /// Serializes, seals and stamps a value and picks its store.
    fn prepare<T>(
        &self,
        key: &str,
        value: &T,
        options: &SetOptions,
    ) -> Result<(Arc<dyn StorageBackend>, CacheEntry)>
    where
        T: Serialize + ?Sized,
    {
        let encoded = self.serializer.encode(value, options.encrypt)?;
        let text = self.seal(encoded.text, options.encrypt)?;
        if text.len() > MAX_VALUE_SIZE {
            return Err(CacheError::Validation(format!(
                "Value of {} bytes exceeds the {} byte limit",
                text.len(),
                MAX_VALUE_SIZE
            )));
        }

        let ttl_ms = options.ttl_ms.or(self.config.default_ttl_ms);
        let store = self.select_store(
            &SelectionContext {
                key,
                size_bytes: text.len(),
                ttl_ms,
                encrypted: options.encrypt,
                available: &self.available_ids(),
            },
            options.store.as_deref(),
        )?;

        let entry = CacheEntry::new(key, text, encoded.kind, store.id(), ttl_ms)
            .encrypted(options.encrypt);
        Ok((store, entry))
    }

    /// Drops older copies of `key` from every available store except
    /// `kept`, so reads stay correct once the routing hint is gone.
    /// Failures are logged and skipped.
    async fn supersede(&self, kept: &str, key: &str) {
        let store_key = self.keys.to_store(key);
        for store in self.available_stores().filter(|store| store.id() != kept) {
            if let Err(err) = store.remove_item(&store_key).await {
                self.record_store_error(store.id(), Some(key), &err);
            }
        }
    }

    /// Bookkeeping after a successful write.
    fn written(&self, store: &str, key: &str) {
        self.routes
            .lock()
            .set(key.to_string(), store.to_string(), None);
        self.record(store, CacheStats::record_set);
        self.emit(CacheEvent::new(EventKind::Set, Some(key), Some(store)));
    }

    // == Get ==
    /// Reads a value, probing stores fastest first.
    ///
    /// Misses, expired entries and entries that cannot be decoded all come
    /// back as `Ok(None)`; only an invalid key is an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        match self.lookup(key, true).await {
            Some((store, entry)) => Ok(self.open(store.id(), &entry)),
            None => Ok(None),
        }
    }

    /// Whether a live entry exists anywhere. Does not count as a read.
    pub async fn has(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.lookup(key, false).await.is_some())
    }

    // == Remember ==
    /// Returns the cached value or computes, stores and returns it.
    ///
    /// `producer` runs at most once. If storing the computed value fails for
    /// any reason other than validation, the failure is logged and the value
    /// is still returned.
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: &RememberOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !options.force_refresh {
            if let Some(value) = self.get(key).await? {
                return Ok(value);
            }
        }

        let value = producer().await?;
        match self.set(key, &value, &options.set).await {
            Ok(()) => {}
            Err(err @ CacheError::Validation(_)) => return Err(err),
            Err(err) => warn!("Could not cache computed value for '{}': {}", key, err),
        }
        Ok(value)
    }

    // == Remove ==
    /// Removes `key` from every available store, best effort.
    pub async fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let store_key = self.keys.to_store(key);

        for store in self.available_stores() {
            match store.remove_item(&store_key).await {
                Ok(()) => self.record(store.id(), CacheStats::record_remove),
                Err(err) => self.record_store_error(store.id(), Some(key), &err),
            }
        }

        self.routes.lock().delete(key);
        self.emit(CacheEvent::new(EventKind::Remove, Some(key), None));
        Ok(())
    }

    // == Clear ==
    /// Empties every available store.
    ///
    /// With a key prefix or obfuscator only this engine's keys are removed;
    /// otherwise each store is cleared wholesale.
    pub async fn clear(&self) -> Result<()> {
        for store in self.available_stores() {
            let result = if self.keys.is_scoped() {
                self.clear_scoped(store.as_ref()).await
            } else {
                store.clear().await
            };
            if let Err(err) = result {
                self.record_store_error(store.id(), None, &err);
            }
        }

        self.routes.lock().clear();
        self.emit(CacheEvent::new(EventKind::Clear, None, None));
        Ok(())
    }

    async fn clear_scoped(&self, store: &dyn StorageBackend) -> Result<()> {
        for stored in store.keys().await? {
            if self.keys.from_store(&stored).is_some() {
                store.remove_item(&stored).await?;
            }
        }
        Ok(())
    }

    // == Keys ==
    /// Caller keys present in any available store, fastest store first.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        for store in self.available_stores() {
            match store.keys().await {
                Ok(stored) => {
                    for key in stored.iter().filter_map(|k| self.keys.from_store(k)) {
                        if seen.insert(key.clone()) {
                            keys.push(key);
                        }
                    }
                }
                Err(err) => self.record_store_error(store.id(), None, &err),
            }
        }
        Ok(keys)
    }

    // == Purge Expired ==
    /// Sweeps expired entries out of every store and the internal caches.
    ///
    /// Returns the number of store entries removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let mut purged = 0;
        for store in self.available_stores() {
            match store.cleanup().await {
                Ok(count) => purged += count,
                Err(err) => self.record_store_error(store.id(), None, &err),
            }
        }

        let hints = self.routes.lock().cleanup();
        let encodings = self.serializer.cleanup();
        let throttled = self.events.cleanup();
        debug!(
            "Purged {} store entries, {} routing hints, {} cached encodings, {} throttle slots",
            purged, hints, encodings, throttled
        );
        Ok(purged)
    }

    // == Stats ==
    pub fn stats(&self) -> EngineStats {
        let stores: BTreeMap<String, CacheStats> = self
            .stats
            .lock()
            .iter()
            .map(|(id, stats)| (id.clone(), stats.clone()))
            .collect();

        let mut total = CacheStats::new();
        for stats in stores.values() {
            total.merge(stats);
        }

        EngineStats {
            hit_rate: total.hit_rate(),
            total,
            stores,
            routing_hints: self.routes.lock().len(),
            serializer_cache: self.serializer.cached_len(),
        }
    }

    // == Store Selection ==
    /// Picks the store for a write.
    ///
    /// Order: the explicit store (which must be available), the selection
    /// policy's choice if available, the configured default if available,
    /// then the first available store in preference order.
    pub fn select_store(
        &self,
        ctx: &SelectionContext<'_>,
        explicit: Option<&str>,
    ) -> Result<Arc<dyn StorageBackend>> {
        if let Some(id) = explicit {
            return self
                .store(id)
                .filter(|store| store.is_available())
                .cloned()
                .ok_or_else(|| {
                    CacheError::NoStoreAvailable(format!("requested store '{id}' is not available"))
                });
        }

        if let Some(policy) = &self.selection {
            match policy.select(ctx) {
                Some(id) => match self.available_store(&id) {
                    Some(store) => {
                        self.emit(CacheEvent::new(
                            EventKind::Strategy,
                            Some(ctx.key),
                            Some(store.id()),
                        ));
                        return Ok(store);
                    }
                    None => debug!(
                        "Policy '{}' chose unavailable store '{}' for '{}'",
                        policy.name(),
                        id,
                        ctx.key
                    ),
                },
                None => debug!("Policy '{}' deferred for '{}'", policy.name(), ctx.key),
            }
        }

        if let Some(id) = &self.config.default_store {
            if let Some(store) = self.available_store(id) {
                return Ok(store);
            }
        }

        self.available_stores()
            .next()
            .cloned()
            .ok_or_else(|| CacheError::NoStoreAvailable("no backing store is available".into()))
    }

    // == Internals ==
    fn available_stores(&self) -> impl Iterator<Item = &Arc<dyn StorageBackend>> {
        self.stores.iter().filter(|store| store.is_available())
    }

    fn available_store(&self, id: &str) -> Option<Arc<dyn StorageBackend>> {
        self.available_stores().find(|store| store.id() == id).cloned()
    }

    fn available_ids(&self) -> Vec<String> {
        self.available_stores()
            .map(|store| store.id().to_string())
            .collect()
    }

    fn validate_options(&self, options: &SetOptions) -> Result<()> {
        if options.ttl_ms == Some(0) {
            return Err(CacheError::Validation("ttl_ms must be positive".to_string()));
        }
        if options.encrypt && self.cipher.is_none() {
            return Err(CacheError::Validation(
                "encryption requested but no cipher is configured".to_string(),
            ));
        }
        Ok(())
    }

    fn seal(&self, text: String, encrypt: bool) -> Result<String> {
        match (&self.cipher, encrypt) {
            (Some(cipher), true) => cipher.encrypt(&text),
            _ => Ok(text),
        }
    }

    /// Probe order: the routing hint first, then preference order.
    fn probe_order(&self, key: &str) -> Vec<Arc<dyn StorageBackend>> {
        let hint = self.routes.lock().get(key).cloned();
        let mut order: Vec<Arc<dyn StorageBackend>> = Vec::with_capacity(self.stores.len());
        if let Some(store) = hint.and_then(|id| self.available_store(&id)) {
            order.push(store);
        }
        for store in self.available_stores() {
            if !order.iter().any(|o| o.id() == store.id()) {
                order.push(store.clone());
            }
        }
        order
    }

    /// Finds the first live entry for `key`.
    ///
    /// Expired and undecodable entries are purged on the way. With `track`
    /// set the probe counts as a read: hits and misses are recorded, a get
    /// event is emitted and hits outside memory are promoted.
    async fn lookup(
        &self,
        key: &str,
        track: bool,
    ) -> Option<(Arc<dyn StorageBackend>, CacheEntry)> {
        let store_key = self.keys.to_store(key);

        for store in self.probe_order(key) {
            let bytes = match store.get_item(&store_key).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    self.record_store_error(store.id(), Some(key), &err);
                    continue;
                }
            };

            let mut entry = match CacheEntry::from_bytes(&bytes) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Dropping corrupt entry '{}' in '{}': {}", key, store.id(), err);
                    self.discard(store.as_ref(), key, &store_key).await;
                    continue;
                }
            };

            if entry.is_expired() {
                self.discard(store.as_ref(), key, &store_key).await;
                self.record(store.id(), CacheStats::record_expiration);
                self.emit(CacheEvent::new(EventKind::Expired, Some(key), Some(store.id())));
                continue;
            }

            self.routes
                .lock()
                .set(key.to_string(), store.id().to_string(), None);

            if track {
                entry.touch();
                self.record(store.id(), CacheStats::record_hit);
                self.emit(CacheEvent::new(EventKind::Get, Some(key), Some(store.id())));
                if store.id() != MEMORY {
                    self.promote(&store_key, key, &entry);
                }
            }
            return Some((store, entry));
        }

        if track {
            for store in self.available_stores() {
                self.record(store.id(), CacheStats::record_miss);
            }
        }
        None
    }

    /// Decrypts and decodes an entry's value; failures are logged misses.
    fn open<T: DeserializeOwned>(&self, store: &str, entry: &CacheEntry) -> Option<T> {
        let text = if entry.encrypted {
            let Some(cipher) = &self.cipher else {
                warn!("Entry '{}' in '{}' is encrypted but no cipher is configured", entry.key, store);
                return None;
            };
            match cipher.decrypt(&entry.value) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Could not decrypt '{}' from '{}': {}", entry.key, store, err);
                    return None;
                }
            }
        } else {
            entry.value.clone()
        };

        match self.serializer.decode(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Could not decode '{}' from '{}': {}", entry.key, store, err);
                None
            }
        }
    }

    async fn discard(&self, store: &dyn StorageBackend, key: &str, store_key: &str) {
        if let Err(err) = store.remove_item(store_key).await {
            self.record_store_error(store.id(), Some(key), &err);
        }
        self.routes.lock().delete(key);
    }

    /// Copies a hit from a slower tier into memory in the background, with
    /// the entry's remaining TTL.
    fn promote(&self, store_key: &str, key: &str, entry: &CacheEntry) {
        let Some(memory) = self.available_store(MEMORY) else {
            return;
        };

        let ttl_ms = entry.ttl_remaining_ms();
        if ttl_ms == Some(0) {
            return;
        }

        let mut promoted = entry.clone();
        promoted.store_id = MEMORY.to_string();
        let bytes = match promoted.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Could not promote '{}': {}", key, err);
                return;
            }
        };

        let store_key = store_key.to_string();
        let key = key.to_string();
        let stats = Arc::clone(&self.stats);
        let routes = Arc::clone(&self.routes);

        tokio::spawn(async move {
            match memory.set_item(&store_key, bytes, ttl_ms).await {
                Ok(()) => {
                    stats
                        .lock()
                        .entry(MEMORY.to_string())
                        .or_default()
                        .record_promotion();
                    routes.lock().set(key.clone(), MEMORY.to_string(), None);
                    debug!("Promoted '{}' to memory", key);
                }
                Err(err) => warn!("Promotion of '{}' to memory failed: {}", key, err),
            }
        });
    }

    fn record(&self, store: &str, update: impl FnOnce(&mut CacheStats)) {
        update(self.stats.lock().entry(store.to_string()).or_default());
    }

    fn record_store_error(&self, store: &str, key: Option<&str>, err: &CacheError) {
        warn!("Store '{}' failed: {}", store, err);
        self.record(store, CacheStats::record_error);
        self.emit(CacheEvent::new(EventKind::Error, key, Some(store)).with_error(err));
    }

    fn emit(&self, event: CacheEvent) {
        self.events.emit(event);
    }
}

// == Validation ==
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::Validation("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::Validation(format!(
            "Key length {} exceeds maximum of {} bytes",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DURABLE, LOCAL, SESSION};
    use serde_json::json;

    fn engine_with(stores: &[&str], config: EngineConfig) -> (CacheEngine, Vec<Arc<MemoryStore>>) {
        let handles: Vec<Arc<MemoryStore>> = stores
            .iter()
            .map(|id| Arc::new(MemoryStore::with_policy(*id, 100, "lru").unwrap()))
            .collect();
        let mut builder = CacheEngine::builder(config);
        for handle in &handles {
            builder = builder.store(handle.clone());
        }
        (builder.build().unwrap(), handles)
    }

    fn ctx<'a>(available: &'a [String]) -> SelectionContext<'a> {
        SelectionContext {
            key: "k",
            size_bytes: 10,
            ttl_ms: None,
            encrypted: false,
            available,
        }
    }

    #[derive(Debug)]
    struct Rot13;

    impl ValueCipher for Rot13 {
        fn encrypt(&self, plain: &str) -> Result<String> {
            Ok(rot13(plain))
        }

        fn decrypt(&self, sealed: &str) -> Result<String> {
            Ok(rot13(sealed))
        }
    }

    fn rot13(s: &str) -> String {
        s.chars()
            .map(|c| match c {
                'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
                'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
                _ => c,
            })
            .collect()
    }

    #[test]
    fn test_builder_adds_memory_and_sorts_stores() {
        let (engine, _) = engine_with(&[DURABLE, LOCAL], EngineConfig::default());
        assert_eq!(engine.store_ids(), vec![MEMORY, LOCAL, DURABLE]);
    }

    #[test]
    fn test_builder_rejects_duplicate_ids() {
        let result = CacheEngine::builder(EngineConfig::default())
            .store(Arc::new(MemoryStore::new(10)))
            .store(Arc::new(MemoryStore::new(10)))
            .build();
        assert!(matches!(result, Err(CacheError::Validation(_))));
    }

    #[test]
    fn test_builder_rejects_unknown_policy() {
        let config = EngineConfig {
            eviction_policy: "clock".to_string(),
            ..EngineConfig::default()
        };
        assert!(CacheEngine::with_config(config).is_err());
    }

    #[test]
    fn test_select_explicit_store_must_be_available() {
        let (engine, handles) = engine_with(&[MEMORY, LOCAL], EngineConfig::default());
        let available = engine.available_ids();

        let chosen = engine.select_store(&ctx(&available), Some(LOCAL)).unwrap();
        assert_eq!(chosen.id(), LOCAL);

        handles[1].set_available(false);
        let result = engine.select_store(&ctx(&available), Some(LOCAL));
        assert!(matches!(result, Err(CacheError::NoStoreAvailable(_))));
    }

    #[test]
    fn test_select_default_then_preference_order() {
        let config = EngineConfig {
            default_store: Some(SESSION.to_string()),
            ..EngineConfig::default()
        };
        let (engine, handles) = engine_with(&[MEMORY, SESSION, LOCAL], config);
        let available = engine.available_ids();

        assert_eq!(engine.select_store(&ctx(&available), None).unwrap().id(), SESSION);

        handles[1].set_available(false);
        assert_eq!(engine.select_store(&ctx(&available), None).unwrap().id(), MEMORY);

        handles[0].set_available(false);
        assert_eq!(engine.select_store(&ctx(&available), None).unwrap().id(), LOCAL);

        handles[2].set_available(false);
        let result = engine.select_store(&ctx(&available), None);
        assert!(matches!(result, Err(CacheError::NoStoreAvailable(_))));
    }

    #[test]
    fn test_select_policy_falls_back_when_choice_unavailable() {
        let (engine, _) = engine_with(&[MEMORY, LOCAL], EngineConfig::default());
        let engine = CacheEngine {
            selection: Some(Box::new(TtlTieredPolicy::default())),
            ..engine
        };
        let available = engine.available_ids();

        // no TTL -> local
        assert_eq!(engine.select_store(&ctx(&available), None).unwrap().id(), LOCAL);

        // bounded TTL -> session, which is not registered
        let long_ttl = SelectionContext {
            ttl_ms: Some(3_600_000),
            ..ctx(&available)
        };
        assert_eq!(engine.select_store(&long_ttl, None).unwrap().id(), MEMORY);
    }

    #[tokio::test]
    async fn test_set_get_roundtrip_and_stats() {
        let engine = CacheEngine::with_config(EngineConfig::default()).unwrap();

        engine
            .set("user:1", &json!({"name": "ada"}), &SetOptions::default())
            .await
            .unwrap();
        let value: Option<serde_json::Value> = engine.get("user:1").await.unwrap();
        assert_eq!(value, Some(json!({"name": "ada"})));

        let missing: Option<String> = engine.get("user:2").await.unwrap();
        assert!(missing.is_none());

        let stats = engine.stats();
        assert_eq!(stats.total.sets, 1);
        assert_eq!(stats.total.hits, 1);
        assert_eq!(stats.total.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_invalid_requests_fail_before_io() {
        let engine = CacheEngine::with_config(EngineConfig::default()).unwrap();

        assert!(matches!(
            engine.set("", &1, &SetOptions::default()).await,
            Err(CacheError::Validation(_))
        ));
        assert!(matches!(
            engine.set(&"k".repeat(MAX_KEY_LENGTH + 1), &1, &SetOptions::default()).await,
            Err(CacheError::Validation(_))
        ));
        assert!(matches!(
            engine.set("k", &1, &SetOptions::ttl(0)).await,
            Err(CacheError::Validation(_))
        ));
        let encrypt = SetOptions {
            encrypt: true,
            ..SetOptions::default()
        };
        assert!(matches!(
            engine.set("k", &1, &encrypt).await,
            Err(CacheError::Validation(_))
        ));
        assert_eq!(engine.stats().total.sets, 0);
    }

    #[tokio::test]
    async fn test_huge_ttl_roundtrips() {
        let (engine, _) = engine_with(&[LOCAL], EngineConfig::default());

        assert!(engine.set("k", "v", &SetOptions::ttl(u64::MAX)).await.is_ok());
        let value: Option<String> = engine.get("k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));

        let local = SetOptions {
            ttl_ms: Some(u64::MAX),
            store: Some(LOCAL.to_string()),
            encrypt: false,
        };
        assert!(engine.set("far", &7u32, &local).await.is_ok());
        assert_eq!(engine.get::<u32>("far").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_encrypted_values_are_sealed_at_rest() {
        let store = Arc::new(MemoryStore::new(10));
        let engine = CacheEngine::builder(EngineConfig::default())
            .store(store.clone())
            .cipher(Arc::new(Rot13))
            .build()
            .unwrap();

        let options = SetOptions {
            encrypt: true,
            ..SetOptions::default()
        };
        engine.set("secret", "hello", &options).await.unwrap();

        let raw = store.get_item("secret").await.unwrap().unwrap();
        let entry = CacheEntry::from_bytes(&raw).unwrap();
        assert!(entry.encrypted);
        assert_eq!(entry.value, "\"uryyb\"");

        let value: Option<String> = engine.get("secret").await.unwrap();
        assert_eq!(value.as_deref(), Some("hello"));
        assert_eq!(engine.stats().serializer_cache, 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_self_heals() {
        let store = Arc::new(MemoryStore::new(10));
        let engine = CacheEngine::builder(EngineConfig::default())
            .store(store.clone())
            .build()
            .unwrap();

        store.set_item("k", b"garbage".to_vec(), None).await.unwrap();
        let value: Option<u32> = engine.get("k").await.unwrap();
        assert!(value.is_none());
        assert!(store.get_item("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_type_mismatch_reads_as_miss_and_keeps_entry() {
        let engine = CacheEngine::with_config(EngineConfig::default()).unwrap();
        engine.set("k", "text", &SetOptions::default()).await.unwrap();

        let wrong: Option<u32> = engine.get("k").await.unwrap();
        assert!(wrong.is_none());
        assert!(engine.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_skips_producer_on_hit() {
        let engine = CacheEngine::with_config(EngineConfig::default()).unwrap();
        engine.set("k", &1u32, &SetOptions::default()).await.unwrap();

        let value: u32 = engine
            .remember("k", || async { Ok(2u32) }, &RememberOptions::default())
            .await
            .unwrap();
        assert_eq!(value, 1);

        let refresh = RememberOptions {
            force_refresh: true,
            ..RememberOptions::default()
        };
        let value: u32 = engine
            .remember("k", || async { Ok(3u32) }, &refresh)
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(engine.get::<u32>("k").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_remember_propagates_producer_error() {
        let engine = CacheEngine::with_config(EngineConfig::default()).unwrap();
        let result: Result<u32> = engine
            .remember(
                "k",
                || async { Err(CacheError::Timeout(std::time::Duration::from_millis(1))) },
                &RememberOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Timeout(_))));
        assert!(!engine.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let engine = CacheEngine::with_config(EngineConfig::default()).unwrap();
        let mut rx = engine.subscribe();

        engine.set("k", &1, &SetOptions::default()).await.unwrap();
        engine.remove("k").await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Set);
        assert_eq!(first.store.as_deref(), Some(MEMORY));
        assert_eq!(second.kind, EventKind::Remove);
    }
}
