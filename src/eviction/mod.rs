//! Eviction Module
//!
//! Seven interchangeable policies that track a set of keys and answer
//! "which key goes next" for a bounded tier:
//!
//! | Policy   | Candidate                                        |
//! |----------|--------------------------------------------------|
//! | `lru`    | least recently touched                           |
//! | `lfu`    | lowest access count, oldest access on ties       |
//! | `fifo`   | oldest insertion                                 |
//! | `mru`    | most recently touched                            |
//! | `random` | uniform sample                                   |
//! | `ttl`    | expired key, else soonest expiry                 |
//! | `arc`    | LRU or LFU, chosen by an adaptive weight         |
//!
//! Unknown keys are never an error: the owning tier is the source of truth
//! for key existence, so redundant removals and accesses are ignored.

mod arc;
mod fifo;
mod lfu;
mod lru;
mod mru;
mod random;
mod registry;
mod rng;
mod ttl;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

pub use arc::{ArcStrategy, ArcTuning};
pub use fifo::FifoStrategy;
pub use lfu::LfuStrategy;
pub use lru::LruStrategy;
pub use mru::MruStrategy;
pub use random::RandomStrategy;
pub use registry::{StrategyConstructor, StrategyRegistry};
pub use rng::{RandomSource, ScriptedSource, XorShift64};
pub use ttl::TtlStrategy;

// == Strategy Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Lru,
    Lfu,
    Fifo,
    Mru,
    Random,
    Ttl,
    Arc,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Lru,
        StrategyKind::Lfu,
        StrategyKind::Fifo,
        StrategyKind::Mru,
        StrategyKind::Random,
        StrategyKind::Ttl,
        StrategyKind::Arc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Lru => "lru",
            StrategyKind::Lfu => "lfu",
            StrategyKind::Fifo => "fifo",
            StrategyKind::Mru => "mru",
            StrategyKind::Random => "random",
            StrategyKind::Ttl => "ttl",
            StrategyKind::Arc => "arc",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CacheError::Validation(format!("Unknown eviction policy: {s}")))
    }
}

// == Strategy Stats ==
/// Snapshot of a strategy's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub kind: StrategyKind,
    /// Number of tracked keys
    pub tracked: usize,
    /// ARC only: current LRU weight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// ARC only: weight adjustments so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustments: Option<u64>,
}

// == Eviction Strategy ==
/// Closed set of eviction policies, dispatched by `match`.
#[derive(Debug)]
pub enum EvictionStrategy {
    Lru(LruStrategy),
    Lfu(LfuStrategy),
    Fifo(FifoStrategy),
    Mru(MruStrategy),
    Random(RandomStrategy),
    Ttl(TtlStrategy),
    Arc(Box<ArcStrategy>),
}

impl EvictionStrategy {
    // == Constructor ==
    /// Builds a policy with default settings.
    pub fn new(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Lru => EvictionStrategy::Lru(LruStrategy::new()),
            StrategyKind::Lfu => EvictionStrategy::Lfu(LfuStrategy::new()),
            StrategyKind::Fifo => EvictionStrategy::Fifo(FifoStrategy::new()),
            StrategyKind::Mru => EvictionStrategy::Mru(MruStrategy::new()),
            StrategyKind::Random => EvictionStrategy::Random(RandomStrategy::new()),
            StrategyKind::Ttl => EvictionStrategy::Ttl(TtlStrategy::new()),
            StrategyKind::Arc => EvictionStrategy::Arc(Box::default()),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            EvictionStrategy::Lru(_) => StrategyKind::Lru,
            EvictionStrategy::Lfu(_) => StrategyKind::Lfu,
            EvictionStrategy::Fifo(_) => StrategyKind::Fifo,
            EvictionStrategy::Mru(_) => StrategyKind::Mru,
            EvictionStrategy::Random(_) => StrategyKind::Random,
            EvictionStrategy::Ttl(_) => StrategyKind::Ttl,
            EvictionStrategy::Arc(_) => StrategyKind::Arc,
        }
    }

    // == Record Access ==
    /// Marks a key as freshly used. FIFO, Random and TTL ignore reads.
    pub fn record_access(&mut self, key: &str) {
        match self {
            EvictionStrategy::Lru(s) => s.record_access(key),
            EvictionStrategy::Lfu(s) => s.record_access(key),
            EvictionStrategy::Mru(s) => s.record_access(key),
            EvictionStrategy::Arc(s) => s.record_access(key),
            EvictionStrategy::Fifo(_)
            | EvictionStrategy::Random(_)
            | EvictionStrategy::Ttl(_) => {}
        }
    }

    // == Record Add ==
    /// Registers or refreshes a key. `ttl_ms` is only used by TTL.
    pub fn record_add(&mut self, key: &str, ttl_ms: Option<u64>) {
        match self {
            EvictionStrategy::Lru(s) => s.record_add(key),
            EvictionStrategy::Lfu(s) => s.record_add(key),
            EvictionStrategy::Fifo(s) => s.record_add(key),
            EvictionStrategy::Mru(s) => s.record_add(key),
            EvictionStrategy::Random(s) => s.record_add(key),
            EvictionStrategy::Ttl(s) => s.record_add(key, ttl_ms),
            EvictionStrategy::Arc(s) => s.record_add(key),
        }
    }

    // == Eviction Key ==
    /// Best eviction candidate, or None when nothing is tracked.
    ///
    /// Tracking state is left untouched; Random and ARC advance their
    /// random source, which is why this takes `&mut self`.
    pub fn eviction_key(&mut self) -> Option<String> {
        match self {
            EvictionStrategy::Lru(s) => s.eviction_key(),
            EvictionStrategy::Lfu(s) => s.eviction_key(),
            EvictionStrategy::Fifo(s) => s.eviction_key(),
            EvictionStrategy::Mru(s) => s.eviction_key(),
            EvictionStrategy::Random(s) => s.eviction_key(),
            EvictionStrategy::Ttl(s) => s.eviction_key(),
            EvictionStrategy::Arc(s) => s.eviction_key(),
        }
    }

    // == Remove ==
    pub fn remove_key(&mut self, key: &str) {
        match self {
            EvictionStrategy::Lru(s) => s.remove_key(key),
            EvictionStrategy::Lfu(s) => s.remove_key(key),
            EvictionStrategy::Fifo(s) => s.remove_key(key),
            EvictionStrategy::Mru(s) => s.remove_key(key),
            EvictionStrategy::Random(s) => s.remove_key(key),
            EvictionStrategy::Ttl(s) => s.remove_key(key),
            EvictionStrategy::Arc(s) => s.remove_key(key),
        }
    }

    // == Clear ==
    pub fn clear(&mut self) {
        match self {
            EvictionStrategy::Lru(s) => s.clear(),
            EvictionStrategy::Lfu(s) => s.clear(),
            EvictionStrategy::Fifo(s) => s.clear(),
            EvictionStrategy::Mru(s) => s.clear(),
            EvictionStrategy::Random(s) => s.clear(),
            EvictionStrategy::Ttl(s) => s.clear(),
            EvictionStrategy::Arc(s) => s.clear(),
        }
    }

    // == Length ==
    pub fn len(&self) -> usize {
        match self {
            EvictionStrategy::Lru(s) => s.len(),
            EvictionStrategy::Lfu(s) => s.len(),
            EvictionStrategy::Fifo(s) => s.len(),
            EvictionStrategy::Mru(s) => s.len(),
            EvictionStrategy::Random(s) => s.len(),
            EvictionStrategy::Ttl(s) => s.len(),
            EvictionStrategy::Arc(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            EvictionStrategy::Lru(s) => s.contains(key),
            EvictionStrategy::Lfu(s) => s.contains(key),
            EvictionStrategy::Fifo(s) => s.contains(key),
            EvictionStrategy::Mru(s) => s.contains(key),
            EvictionStrategy::Random(s) => s.contains(key),
            EvictionStrategy::Ttl(s) => s.contains(key),
            EvictionStrategy::Arc(s) => s.contains(key),
        }
    }

    // == Stats ==
    pub fn stats(&self) -> StrategyStats {
        let (weight, adjustments) = match self {
            EvictionStrategy::Arc(s) => (Some(s.weight()), Some(s.adjustments())),
            _ => (None, None),
        };
        StrategyStats {
            kind: self.kind(),
            tracked: self.len(),
            weight,
            adjustments,
        }
    }
}
