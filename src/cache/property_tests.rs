//! Property-Based Tests for the eviction policies, the bounded map and the
//! batch pipeline
//!
//! Uses proptest to check each structure against a simple model.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cache::BoundedExpiringMap;
use crate::error::CacheError;
use crate::eviction::{
    ArcStrategy, ArcTuning, FifoStrategy, LfuStrategy, LruStrategy, MruStrategy, RandomStrategy,
    TtlStrategy, XorShift64,
};
use crate::pipeline::{BatchConfig, BatchMode, BatchPipeline};

// == Strategies ==
/// Keys from a small alphabet so sequences revisit keys often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-h]".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum TrackOp {
    Add(String),
    Access(String),
    Remove(String),
}

fn track_op_strategy() -> impl Strategy<Value = TrackOp> {
    prop_oneof![
        3 => key_strategy().prop_map(TrackOp::Add),
        3 => key_strategy().prop_map(TrackOp::Access),
        1 => key_strategy().prop_map(TrackOp::Remove),
    ]
}

/// Recency model: front = least recently touched.
fn touch(model: &mut Vec<String>, key: &str) {
    model.retain(|k| k != key);
    model.push(key.to_string());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // **Property 1: LRU candidate is the least recently touched key**
    // After an access the touched key is never the candidate unless it is
    // the only tracked key.
    #[test]
    fn prop_lru_evicts_least_recently_touched(ops in prop::collection::vec(track_op_strategy(), 1..80)) {
        let mut lru = LruStrategy::new();
        let mut model: Vec<String> = Vec::new();

        for op in ops {
            match op {
                TrackOp::Add(key) => {
                    lru.record_add(&key);
                    touch(&mut model, &key);
                }
                TrackOp::Access(key) => {
                    lru.record_access(&key);
                    if model.contains(&key) {
                        touch(&mut model, &key);
                        if model.len() > 1 {
                            prop_assert_ne!(lru.eviction_key(), Some(key.clone()));
                        }
                    }
                }
                TrackOp::Remove(key) => {
                    lru.remove_key(&key);
                    model.retain(|k| *k != key);
                }
            }
            prop_assert_eq!(lru.eviction_key(), model.first().cloned());
            prop_assert_eq!(lru.len(), model.len());
        }
    }

    // **Property 2: MRU candidate is the most recently touched key**
    #[test]
    fn prop_mru_evicts_most_recently_touched(ops in prop::collection::vec(track_op_strategy(), 1..80)) {
        let mut mru = MruStrategy::new();
        let mut model: Vec<String> = Vec::new();

        for op in ops {
            match op {
                TrackOp::Add(key) => {
                    mru.record_add(&key);
                    touch(&mut model, &key);
                }
                TrackOp::Access(key) => {
                    mru.record_access(&key);
                    if model.contains(&key) {
                        touch(&mut model, &key);
                    }
                }
                TrackOp::Remove(key) => {
                    mru.remove_key(&key);
                    model.retain(|k| *k != key);
                }
            }
            prop_assert_eq!(mru.eviction_key(), model.last().cloned());
        }
    }

    // **Property 3: LFU candidate has the lowest frequency**
    #[test]
    fn prop_lfu_evicts_lowest_frequency(ops in prop::collection::vec(track_op_strategy(), 1..80)) {
        let mut lfu = LfuStrategy::new();
        let mut counts: HashMap<String, u64> = HashMap::new();

        for op in ops {
            match op {
                TrackOp::Add(key) => {
                    lfu.record_add(&key);
                    *counts.entry(key).or_insert(0) += 1;
                }
                TrackOp::Access(key) => {
                    lfu.record_access(&key);
                    if let Some(count) = counts.get_mut(&key) {
                        *count += 1;
                    }
                }
                TrackOp::Remove(key) => {
                    lfu.remove_key(&key);
                    counts.remove(&key);
                }
            }

            match lfu.eviction_key() {
                Some(candidate) => {
                    let min = counts.values().copied().min();
                    prop_assert_eq!(counts.get(&candidate).copied(), min);
                    prop_assert_eq!(lfu.frequency(&candidate), min);
                }
                None => prop_assert!(counts.is_empty()),
            }
        }
    }

    // **Property 4: FIFO evicts in insertion order**
    // For distinct keys inserted k1, k2, k3 with no re-insertion, repeated
    // evictions yield exactly k1, k2, k3.
    #[test]
    fn prop_fifo_evicts_in_insertion_order(keys in prop::collection::hash_set("[a-z]{1,8}", 1..30)) {
        let keys: Vec<String> = keys.into_iter().collect();
        let mut fifo = FifoStrategy::new();
        for key in &keys {
            fifo.record_add(key);
        }

        let mut evicted = Vec::new();
        while let Some(candidate) = fifo.eviction_key() {
            fifo.remove_key(&candidate);
            evicted.push(candidate);
        }
        prop_assert_eq!(evicted, keys);
    }

    // **Property 5: Random and TTL candidates are always tracked keys**
    #[test]
    fn prop_candidates_are_tracked(
        seed in any::<u64>(),
        adds in prop::collection::vec((key_strategy(), prop::option::of(1u64..10_000)), 1..40),
    ) {
        let mut random = RandomStrategy::with_rng(Box::new(XorShift64::new(seed)));
        let mut ttl = TtlStrategy::new();
        let mut expiring: HashSet<String> = HashSet::new();

        for (key, ttl_ms) in adds {
            random.record_add(&key);
            ttl.record_add(&key, ttl_ms);
            match ttl_ms {
                Some(_) => { expiring.insert(key); }
                None => { expiring.remove(&key); }
            }

            let candidate = random.eviction_key();
            prop_assert!(candidate.map(|k| random.contains(&k)).unwrap_or(false));

            match ttl.eviction_key() {
                Some(candidate) => {
                    prop_assert!(expiring.contains(&candidate));
                    let soonest = expiring.iter().filter_map(|k| ttl.expires_at(k)).min();
                    prop_assert_eq!(ttl.expires_at(&candidate), soonest);
                }
                None => prop_assert!(expiring.is_empty()),
            }
        }
    }

    // **Property 6: ARC weight stays within its bounds**
    #[test]
    fn prop_arc_weight_stays_bounded(
        ops in prop::collection::vec((key_strategy(), any::<bool>()), 1..1_000),
        window in 1u64..50,
    ) {
        let tuning = ArcTuning { window, ..ArcTuning::default() };
        let mut arc = ArcStrategy::with_rng(tuning.clone(), Box::new(XorShift64::new(7)));

        for (key, is_access) in ops {
            if is_access {
                arc.record_access(&key);
            } else {
                arc.record_add(&key);
            }
            prop_assert!(arc.weight() >= tuning.min_weight);
            prop_assert!(arc.weight() <= tuning.max_weight);
            if let Some(candidate) = arc.eviction_key() {
                prop_assert!(arc.contains(&candidate));
            }
        }
    }

    // **Property 7: Capacity invariant of the bounded map**
    // Size never exceeds capacity and every insertion beyond capacity evicts
    // exactly one entry, firing the callback exactly once.
    #[test]
    fn prop_bounded_map_respects_capacity(
        capacity in 1usize..10,
        keys in prop::collection::vec(key_strategy(), 1..60),
    ) {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = evictions.clone();
        let mut map = BoundedExpiringMap::new(capacity)
            .with_eviction_callback(move |_key: String, _value: usize| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let mut expected_evictions = 0;
        for (value, key) in keys.into_iter().enumerate() {
            let is_new = !map.has(key.as_str());
            let was_full = map.len() == capacity;
            map.set(key, value, None);
            if is_new && was_full {
                expected_evictions += 1;
            }
            prop_assert!(map.len() <= capacity);
            prop_assert_eq!(evictions.load(Ordering::SeqCst), expected_evictions);
        }
    }

    // **Property 8: Expired entries are never returned**
    // An entry whose expiry is already reached reads as absent and is gone
    // afterwards.
    #[test]
    fn prop_expired_entries_read_as_absent(keys in prop::collection::hash_set(key_strategy(), 1..8)) {
        let mut map = BoundedExpiringMap::new(16);
        for key in &keys {
            map.set(key.clone(), 1u8, Some(0));
        }
        for key in &keys {
            prop_assert!(map.get(key.as_str()).is_none());
            prop_assert!(!map.has(key.as_str()));
        }
        prop_assert!(map.is_empty());
    }

    // **Property 9: Batch partial failure is an exact split**
    // If M of N items fail, the success list has N - M entries, the failure
    // list has M and no index appears in both.
    #[test]
    fn prop_batch_partial_failure_split(
        fails in prop::collection::vec(any::<bool>(), 0..40),
        ordered in any::<bool>(),
    ) {
        let pipeline = BatchPipeline::new(BatchConfig {
            batch_size: 7,
            concurrency: 3,
            max_retries: 0,
            retry_base_delay_ms: 1,
            item_timeout_ms: 1_000,
            mode: if ordered { BatchMode::Ordered } else { BatchMode::Throughput },
        });

        let items: Vec<(usize, bool)> = fails.iter().copied().enumerate().collect();
        let report = tokio_test::block_on(pipeline.run(items, |(index, fail)| async move {
            if fail {
                Err(CacheError::store_io("test", format!("item {index}")))
            } else {
                Ok(index)
            }
        }))
        .unwrap();

        let expected_failures = fails.iter().filter(|f| **f).count();
        prop_assert_eq!(report.failed.len(), expected_failures);
        prop_assert_eq!(report.completed.len(), fails.len() - expected_failures);

        let ok: HashSet<usize> = report.completed.iter().map(|(i, _)| *i).collect();
        let failed: HashSet<usize> = report.failed.iter().map(|f| f.index).collect();
        prop_assert!(ok.is_disjoint(&failed));
        prop_assert_eq!(ok.len() + failed.len(), fails.len());
    }
}
