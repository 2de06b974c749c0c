//! Cache Entry Module
//!
//! Defines the metadata envelope stamped around every value written to a
//! backing store, with TTL support.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Value Kind ==
/// JSON type of the value carried by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    /// Short tag used to keep fingerprints of different types apart.
    pub fn tag(self) -> &'static str {
        match self {
            ValueKind::Null => "z",
            ValueKind::Bool => "b",
            ValueKind::Number => "n",
            ValueKind::String => "s",
            ValueKind::Array => "a",
            ValueKind::Object => "o",
        }
    }

    pub fn is_primitive(self) -> bool {
        !matches!(self, ValueKind::Array | ValueKind::Object)
    }
}

// == Cache Entry ==
/// Represents a single stored entry with its serialized value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-visible key (before prefixing/obfuscation)
    pub key: String,
    /// Serialized (and possibly encrypted) value
    pub value: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last read timestamp (Unix milliseconds), in-memory only
    pub last_accessed_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Number of reads served from this copy, in-memory only
    pub access_count: u64,
    /// Size of `value` in bytes
    pub size_bytes: u64,
    /// Store the entry was written to
    pub store_id: String,
    /// Whether `value` went through the value cipher
    pub encrypted: bool,
    /// JSON type of the original value
    pub kind: ValueKind,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    ///
    /// # Arguments
    /// * `key` - The caller-visible key
    /// * `value` - The serialized value
    /// * `kind` - JSON type of the value
    /// * `store_id` - Target store
    /// * `ttl_ms` - Optional TTL in milliseconds
    pub fn new(
        key: impl Into<String>,
        value: String,
        kind: ValueKind,
        store_id: impl Into<String>,
        ttl_ms: Option<u64>,
    ) -> Self {
        let now = current_timestamp_ms();
        let size_bytes = value.len() as u64;

        Self {
            key: key.into(),
            value,
            created_at: now,
            last_accessed_at: now,
            expires_at: ttl_ms.map(|ttl| now.saturating_add(ttl)),
            access_count: 0,
            size_bytes,
            store_id: store_id.into(),
            encrypted: false,
            kind,
        }
    }

    /// Marks the value as having gone through the value cipher.
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches `expires_at`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let now = current_timestamp_ms();
            expires.saturating_sub(now)
        })
    }

    /// TTL the entry was created with.
    pub fn ttl_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(self.created_at))
    }

    // == Touch ==
    /// Records a read against this copy of the entry.
    pub fn touch(&mut self) {
        self.last_accessed_at = current_timestamp_ms();
        self.access_count += 1;
    }

    // == Encoding ==
    /// Encodes the envelope into the bytes handed to a store.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Decodes an envelope read back from a store.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Corrupted(e.to_string()))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
