//! Tiered Cache - a pluggable multi-tier caching engine
//!
//! Decides which entries to keep (seven eviction policies), where to store
//! them among several backing stores, and how to serialize, route and
//! batch operations against those stores.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod eviction;
pub mod pipeline;
pub mod storage;
pub mod tasks;

pub use cache::{BoundedExpiringMap, CacheEntry, CacheStats};
pub use config::{EngineConfig, SelectionConfig};
pub use engine::{
    CacheEngine, CacheEvent, EngineBuilder, EngineStats, EventKind, KeyObfuscator, MultiOutcome,
    RememberOptions, SelectionPolicy, SetOptions, ValueCipher,
};
pub use error::{CacheError, Result};
pub use eviction::{EvictionStrategy, StrategyKind, StrategyRegistry};
pub use pipeline::{BatchConfig, BatchMode, BatchPipeline, BatchReport};
pub use storage::{BatchCapability, MemoryStore, StorageBackend};
pub use tasks::{spawn_cleanup_task, CleanupTask};
