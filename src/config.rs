//! Configuration Module
//!
//! Handles loading and managing engine configuration from environment
//! variables. Every struct is also serde-(de)serializable so a host
//! application can embed it in its own config file.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::SelectionPolicyKind;
use crate::eviction::ArcTuning;
use crate::pipeline::BatchConfig;

// == Selection Config ==
/// Policy-driven store selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub enabled: bool,
    pub policy: SelectionPolicyKind,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: SelectionPolicyKind::Size,
        }
    }
}

// == Engine Config ==
/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store used when no explicit or policy choice applies
    pub default_store: Option<String>,
    /// Prefix prepended to every key before it reaches a store
    pub key_prefix: Option<String>,
    /// Interval of the periodic expired-entry sweep in milliseconds
    pub cleanup_interval_ms: u64,
    /// TTL applied to writes that do not carry one
    pub default_ttl_ms: Option<u64>,
    /// Maximum number of entries of the built-in memory tier
    pub memory_capacity: usize,
    /// Registry name of the memory tier's eviction policy
    pub eviction_policy: String,
    /// Weight adaptation of the `arc` policy
    pub arc: ArcTuning,
    pub selection: SelectionConfig,
    /// Window during which repeated events for one (type, key, store) are dropped
    pub event_throttle_ms: u64,
    pub routing_capacity: usize,
    pub routing_ttl_ms: u64,
    pub serializer_cache_capacity: usize,
    pub serializer_cache_ttl_ms: u64,
    /// Largest encoded value the serialization cache will hold
    pub serializer_max_cached_len: usize,
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_store: None,
            key_prefix: None,
            cleanup_interval_ms: 60_000,
            default_ttl_ms: None,
            memory_capacity: 1000,
            eviction_policy: "lru".to_string(),
            arc: ArcTuning::default(),
            selection: SelectionConfig::default(),
            event_throttle_ms: 100,
            routing_capacity: 1000,
            routing_ttl_ms: 5_000,
            serializer_cache_capacity: 500,
            serializer_cache_ttl_ms: 60_000,
            serializer_max_cached_len: 1024,
            batch: BatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new EngineConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_STORE` - Default store id (default: none)
    /// - `CACHE_KEY_PREFIX` - Key prefix (default: none)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Sweep interval (default: 60000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL (default: none)
    /// - `CACHE_MEMORY_CAPACITY` - Memory tier capacity (default: 1000)
    /// - `CACHE_EVICTION_POLICY` - Memory tier policy (default: lru)
    /// - `CACHE_SELECTION_ENABLED` - Enable policy-driven selection (default: false)
    /// - `CACHE_SELECTION_POLICY` - `size` or `ttl` (default: size)
    /// - `CACHE_EVENT_THROTTLE_MS` - Event throttle window (default: 100)
    /// - `CACHE_BATCH_SIZE` - Batch group size (default: 50)
    /// - `CACHE_BATCH_CONCURRENCY` - Batch groups in flight (default: 4)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_store: env_string("CACHE_DEFAULT_STORE"),
            key_prefix: env_string("CACHE_KEY_PREFIX"),
            cleanup_interval_ms: env_parse("CACHE_CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.cleanup_interval_ms),
            default_ttl_ms: env_parse("CACHE_DEFAULT_TTL_MS"),
            memory_capacity: env_parse("CACHE_MEMORY_CAPACITY").unwrap_or(defaults.memory_capacity),
            eviction_policy: env_string("CACHE_EVICTION_POLICY")
                .unwrap_or_else(|| defaults.eviction_policy.clone()),
            selection: SelectionConfig {
                enabled: env_parse("CACHE_SELECTION_ENABLED")
                    .unwrap_or(defaults.selection.enabled),
                policy: env_parse("CACHE_SELECTION_POLICY").unwrap_or(defaults.selection.policy),
            },
            event_throttle_ms: env_parse("CACHE_EVENT_THROTTLE_MS")
                .unwrap_or(defaults.event_throttle_ms),
            batch: BatchConfig {
                batch_size: env_parse("CACHE_BATCH_SIZE").unwrap_or(defaults.batch.batch_size),
                concurrency: env_parse("CACHE_BATCH_CONCURRENCY")
                    .unwrap_or(defaults.batch.concurrency),
                ..defaults.batch.clone()
            },
            ..defaults
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
