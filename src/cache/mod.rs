//! Cache Module
//!
//! Building blocks shared by the eviction policies, the storage tiers and
//! the engine: entry metadata, statistics, the index-linked list and the
//! bounded expiring map.

mod bounded;
mod entry;
mod list;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use bounded::{BoundedExpiringMap, EvictionCallback};
pub use entry::{current_timestamp_ms, CacheEntry, ValueKind};
pub use list::SlotList;
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed serialized value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
