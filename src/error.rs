//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching engine.
///
/// Single-item operations surface `NoStoreAvailable`, `Serialization` and
/// `Validation` to the caller. `StoreIo` is logged and skipped whenever the
/// engine fans out across several stores, and `BatchItem` only ever appears
/// inside a batch report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// No backing store could be selected for the operation
    #[error("No store available: {0}")]
    NoStoreAvailable(String),

    /// Value could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A single backing store failed an I/O call
    #[error("Store '{store}' failed: {message}")]
    StoreIo { store: String, message: String },

    /// Malformed key, value or options
    #[error("Invalid request: {0}")]
    Validation(String),

    /// One item of a batch failed after exhausting its retries
    #[error("Batch item {index} failed after {attempts} attempt(s): {reason}")]
    BatchItem {
        index: usize,
        attempts: u32,
        reason: String,
    },

    /// An operation did not finish within its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A bounded tier is full and its eviction policy offered no candidate
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// A stored entry could not be decoded
    #[error("Corrupted entry: {0}")]
    Corrupted(String),
}

impl CacheError {
    /// Shorthand for a store I/O failure.
    pub fn store_io(store: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::StoreIo {
            store: store.into(),
            message: message.into(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
