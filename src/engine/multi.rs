//! Multi-key Operations
//!
//! Items are grouped by target store and each group goes out as one batch
//! call when the store supports it. A group whose batch call fails as a
//! whole is retried item by item through the batch pipeline. Item failures
//! are collected, never thrown.

use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{validate_key, CacheEngine, CacheEvent, EventKind, SetOptions};
use crate::cache::{CacheEntry, CacheStats};
use crate::error::{CacheError, Result};
use crate::storage::{BatchWrite, StorageBackend, MEMORY};

// == Multi Outcome ==
/// Per-key split of a multi-key call. No key appears on both sides.
#[derive(Debug, Default)]
pub struct MultiOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, CacheError)>,
}

impl MultiOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct PreparedWrite {
    key: String,
    store_key: String,
    bytes: Vec<u8>,
    ttl_ms: Option<u64>,
}

impl PreparedWrite {
    fn to_batch(&self) -> BatchWrite {
        (self.store_key.clone(), self.bytes.clone(), self.ttl_ms)
    }
}

type StoreGroup<T> = (Arc<dyn StorageBackend>, Vec<T>);
type GroupResult = (String, Vec<(String, Result<()>)>);

fn push_grouped<T>(groups: &mut Vec<StoreGroup<T>>, store: Arc<dyn StorageBackend>, item: T) {
    match groups.iter_mut().find(|(s, _)| s.id() == store.id()) {
        Some((_, items)) => items.push(item),
        None => groups.push((store, vec![item])),
    }
}

impl CacheEngine {
    // == MSet ==
    /// Writes many values, each to the store single-key `set` would pick.
    /// Older copies in the other stores are removed as with `set`.
    ///
    /// An invalid key or invalid options reject the whole call; anything
    /// else fails only the affected item.
    pub async fn mset<T: Serialize>(
        &self,
        items: &[(String, T)],
        options: &SetOptions,
    ) -> Result<MultiOutcome> {
        for (key, _) in items {
            validate_key(key)?;
        }
        self.validate_options(options)?;

        let mut outcome = MultiOutcome::default();
        let mut groups: Vec<StoreGroup<PreparedWrite>> = Vec::new();

        for (key, value) in items {
            let prepared = self.prepare(key, value, options).and_then(|(store, entry)| {
                let write = PreparedWrite {
                    key: key.clone(),
                    store_key: self.keys.to_store(key),
                    bytes: entry.to_bytes()?,
                    ttl_ms: entry.ttl_ms(),
                };
                Ok((store, write))
            });
            match prepared {
                Ok((store, write)) => push_grouped(&mut groups, store, write),
                Err(err) => outcome.failed.push((key.clone(), err)),
            }
        }

        let results = join_all(
            groups
                .into_iter()
                .map(|(store, writes)| self.write_group(store, writes)),
        )
        .await;

        let mut stored: Vec<(String, String)> = Vec::new();
        for (store, group) in results {
            for (key, result) in group {
                match result {
                    Ok(()) => stored.push((store.clone(), key)),
                    Err(err) => {
                        self.record(&store, CacheStats::record_error);
                        outcome.failed.push((key, err));
                    }
                }
            }
        }

        join_all(stored.iter().map(|(store, key)| self.supersede(store, key))).await;
        for (store, key) in stored {
            self.written(&store, &key);
            outcome.succeeded.push(key);
        }

        debug!(
            "mset: {} stored, {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    async fn write_group(
        &self,
        store: Arc<dyn StorageBackend>,
        writes: Vec<PreparedWrite>,
    ) -> GroupResult {
        if let Some(batch) = store.batch() {
            let request: Vec<BatchWrite> = writes.iter().map(PreparedWrite::to_batch).collect();
            match batch.batch_set(request).await {
                Ok(flags) => {
                    let results = writes
                        .into_iter()
                        .enumerate()
                        .map(|(i, write)| {
                            let result = if flags.get(i).copied().unwrap_or(false) {
                                Ok(())
                            } else {
                                Err(CacheError::store_io(store.id(), "item rejected by batch write"))
                            };
                            (write.key, result)
                        })
                        .collect();
                    return (store.id().to_string(), results);
                }
                Err(err) => {
                    warn!(
                        "Batch write of {} item(s) to '{}' failed ({}), retrying item by item",
                        writes.len(),
                        store.id(),
                        err
                    );
                    self.record(store.id(), CacheStats::record_error);
                }
            }
        }

        self.write_individually(store, writes).await
    }

    async fn write_individually(
        &self,
        store: Arc<dyn StorageBackend>,
        writes: Vec<PreparedWrite>,
    ) -> GroupResult {
        let id = store.id().to_string();
        let target = &store;

        let report = self
            .pipeline
            .run(writes.clone(), |write: PreparedWrite| async move {
                target
                    .set_item(&write.store_key, write.bytes, write.ttl_ms)
                    .await
            })
            .await;

        let results = match report {
            Ok(report) => {
                let mut results: Vec<(String, Result<()>)> = Vec::with_capacity(writes.len());
                for (index, ()) in report.completed {
                    results.push((writes[index].key.clone(), Ok(())));
                }
                for failure in report.failed {
                    results.push((writes[failure.index].key.clone(), Err(failure.error)));
                }
                results
            }
            Err(err) => writes
                .into_iter()
                .map(|write| (write.key, Err(err.clone())))
                .collect(),
        };
        (id, results)
    }

    // == MGet ==
    /// Reads many values; the result has one slot per requested key.
    ///
    /// Keys are fetched in one batch per store (the routing hint's store,
    /// or the fastest available one). Anything the batch does not resolve
    /// goes through a full single-key `get`.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<Option<T>>> {
        for key in keys {
            validate_key(key)?;
        }

        let mut results: Vec<Option<T>> = keys.iter().map(|_| None).collect();
        let mut groups: Vec<StoreGroup<usize>> = Vec::new();
        let mut fallback = Vec::new();

        for (index, key) in keys.iter().enumerate() {
            let hint = self.routes.lock().get(key.as_str()).cloned();
            let target = hint
                .and_then(|id| self.available_store(&id))
                .or_else(|| self.available_stores().next().cloned());
            match target {
                Some(store) => push_grouped(&mut groups, store, index),
                None => fallback.push(index),
            }
        }

        let fetched = join_all(
            groups
                .into_iter()
                .map(|(store, indices)| self.read_group::<T>(store, keys, indices)),
        )
        .await;

        for (index, resolved) in fetched.into_iter().flatten() {
            match resolved {
                Some(value) => results[index] = value,
                None => fallback.push(index),
            }
        }

        let retried = join_all(fallback.iter().map(|&index| self.get::<T>(&keys[index]))).await;
        for (index, value) in fallback.into_iter().zip(retried) {
            results[index] = value.ok().flatten();
        }

        Ok(results)
    }

    /// Batch read of one group. `Some(value)` settles the slot, `None`
    /// sends the key to the single-key fallback.
    async fn read_group<T: DeserializeOwned>(
        &self,
        store: Arc<dyn StorageBackend>,
        keys: &[String],
        indices: Vec<usize>,
    ) -> Vec<(usize, Option<Option<T>>)> {
        let Some(batch) = store.batch() else {
            return indices.into_iter().map(|index| (index, None)).collect();
        };

        let store_keys: Vec<String> = indices
            .iter()
            .map(|&index| self.keys.to_store(&keys[index]))
            .collect();

        let slots = match batch.batch_get(&store_keys).await {
            Ok(slots) => slots,
            Err(err) => {
                self.record_store_error(store.id(), None, &err);
                return indices.into_iter().map(|index| (index, None)).collect();
            }
        };

        let mut slots = slots.into_iter();
        indices
            .into_iter()
            .zip(store_keys)
            .map(|(index, store_key)| {
                let resolved = slots
                    .next()
                    .flatten()
                    .and_then(|bytes| self.batch_hit(&store, &keys[index], &store_key, &bytes));
                (index, resolved)
            })
            .collect()
    }

    /// Accepts a live, decodable batch slot as a hit. Expired or corrupt
    /// slots return None so the single-key path can purge them.
    fn batch_hit<T: DeserializeOwned>(
        &self,
        store: &Arc<dyn StorageBackend>,
        key: &str,
        store_key: &str,
        bytes: &[u8],
    ) -> Option<Option<T>> {
        let mut entry = CacheEntry::from_bytes(bytes).ok()?;
        if entry.is_expired() {
            return None;
        }

        entry.touch();
        self.routes
            .lock()
            .set(key.to_string(), store.id().to_string(), None);
        self.record(store.id(), CacheStats::record_hit);
        self.emit(CacheEvent::new(EventKind::Get, Some(key), Some(store.id())));
        if store.id() != MEMORY {
            self.promote(store_key, key, &entry);
        }
        Some(self.open(store.id(), &entry))
    }

    // == MRemove ==
    /// Removes many keys, each best effort across all stores.
    pub async fn mremove(&self, keys: &[String]) -> Result<MultiOutcome> {
        for key in keys {
            validate_key(key)?;
        }

        let results = join_all(keys.iter().map(|key| self.remove(key))).await;
        let mut outcome = MultiOutcome::default();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(()) => outcome.succeeded.push(key.clone()),
                Err(err) => outcome.failed.push((key.clone(), err)),
            }
        }
        Ok(outcome)
    }
}
