//! Store Selection Policies
//!
//! A selection policy proposes a store for a write. The engine only takes
//! the proposal if that store is registered and available; otherwise it
//! falls back to the default store and then to preference order.

use std::fmt::{self, Debug};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::storage::{DURABLE, LOCAL, MEMORY, SESSION};

// == Selection Context ==
/// What a policy gets to look at.
#[derive(Debug, Clone)]
pub struct SelectionContext<'a> {
    pub key: &'a str,
    /// Serialized size; 0 for reads
    pub size_bytes: usize,
    pub ttl_ms: Option<u64>,
    pub encrypted: bool,
    /// Ids of currently available stores, in preference order
    pub available: &'a [String],
}

// == Selection Policy ==
pub trait SelectionPolicy: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Proposed store id, or None to defer to the defaults.
    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String>;
}

// == Policy Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicyKind {
    Size,
    Ttl,
}

impl SelectionPolicyKind {
    pub fn build(self) -> Box<dyn SelectionPolicy> {
        match self {
            SelectionPolicyKind::Size => Box::new(SizeTieredPolicy::default()),
            SelectionPolicyKind::Ttl => Box::new(TtlTieredPolicy::default()),
        }
    }
}

impl fmt::Display for SelectionPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicyKind::Size => f.write_str("size"),
            SelectionPolicyKind::Ttl => f.write_str("ttl"),
        }
    }
}

impl FromStr for SelectionPolicyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "size" => Ok(SelectionPolicyKind::Size),
            "ttl" => Ok(SelectionPolicyKind::Ttl),
            other => Err(CacheError::Validation(format!(
                "Unknown selection policy: {other}"
            ))),
        }
    }
}

// == Size Tiered Policy ==
/// Small values stay in memory, medium ones go local, large ones durable.
#[derive(Debug, Clone)]
pub struct SizeTieredPolicy {
    pub small_bytes: usize,
    pub medium_bytes: usize,
}

impl Default for SizeTieredPolicy {
    fn default() -> Self {
        Self {
            small_bytes: 4 * 1024,
            medium_bytes: 256 * 1024,
        }
    }
}

impl SelectionPolicy for SizeTieredPolicy {
    fn name(&self) -> &str {
        "size"
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        let target = if ctx.size_bytes <= self.small_bytes {
            MEMORY
        } else if ctx.size_bytes <= self.medium_bytes {
            LOCAL
        } else {
            DURABLE
        };
        Some(target.to_string())
    }
}

// == TTL Tiered Policy ==
/// Short-lived values stay in memory, bounded ones go to the session
/// store, values without TTL go local.
#[derive(Debug, Clone)]
pub struct TtlTieredPolicy {
    pub short_ttl_ms: u64,
}

impl Default for TtlTieredPolicy {
    fn default() -> Self {
        Self {
            short_ttl_ms: 60_000,
        }
    }
}

impl SelectionPolicy for TtlTieredPolicy {
    fn name(&self) -> &str {
        "ttl"
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        let target = match ctx.ttl_ms {
            Some(ttl) if ttl <= self.short_ttl_ms => MEMORY,
            Some(_) => SESSION,
            None => LOCAL,
        };
        Some(target.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(size_bytes: usize, ttl_ms: Option<u64>) -> SelectionContext<'static> {
        SelectionContext {
            key: "k",
            size_bytes,
            ttl_ms,
            encrypted: false,
            available: &[],
        }
    }

    #[test]
    fn test_size_policy_tiers() {
        let policy = SizeTieredPolicy::default();
        assert_eq!(policy.select(&ctx(10, None)).as_deref(), Some(MEMORY));
        assert_eq!(policy.select(&ctx(10_000, None)).as_deref(), Some(LOCAL));
        assert_eq!(policy.select(&ctx(1_000_000, None)).as_deref(), Some(DURABLE));
    }

    #[test]
    fn test_ttl_policy_tiers() {
        let policy = TtlTieredPolicy::default();
        assert_eq!(policy.select(&ctx(1, Some(1_000))).as_deref(), Some(MEMORY));
        assert_eq!(policy.select(&ctx(1, Some(3_600_000))).as_deref(), Some(SESSION));
        assert_eq!(policy.select(&ctx(1, None)).as_deref(), Some(LOCAL));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("SIZE".parse::<SelectionPolicyKind>().unwrap(), SelectionPolicyKind::Size);
        assert_eq!(SelectionPolicyKind::Ttl.build().name(), "ttl");
        assert!("weighted".parse::<SelectionPolicyKind>().is_err());
    }
}
