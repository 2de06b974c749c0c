//! Value Serialization
//!
//! Values are encoded to JSON text. Primitives (null, bool, number,
//! string) take a direct path and go through a small bounded cache keyed
//! by a type-tagged fingerprint, so `1` and `"1"` never share a slot.
//! Confidential values never touch the cache.
//!
//! Nesting deeper than [`MAX_DEPTH`] is cut off and replaced with
//! [`CIRCULAR_SENTINEL`] instead of failing the write; anything deeper
//! could not be decoded again.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::cache::{BoundedExpiringMap, ValueKind};
use crate::error::{CacheError, Result};

/// Marker written in place of a subtree that nests too deeply.
pub const CIRCULAR_SENTINEL: &str = "[Circular]";

/// Deepest container nesting kept as-is.
pub const MAX_DEPTH: usize = 100;

/// Encryption collaborator for confidential values.
pub trait ValueCipher: Send + Sync + Debug {
    fn encrypt(&self, plain: &str) -> Result<String>;
    fn decrypt(&self, sealed: &str) -> Result<String>;
}

// == Encoded ==
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub text: String,
    pub kind: ValueKind,
}

// == Serializer ==
#[derive(Debug)]
pub struct Serializer {
    cache: Mutex<BoundedExpiringMap<String, String>>,
    max_cached_len: usize,
    cache_hits: AtomicU64,
}

impl Serializer {
    /// # Arguments
    /// * `capacity` - Entries of the fingerprint cache
    /// * `ttl_ms` - Lifetime of a cached encoding
    /// * `max_cached_len` - Longest value (raw and encoded) eligible for caching
    pub fn new(capacity: usize, ttl_ms: u64, max_cached_len: usize) -> Self {
        Self {
            cache: Mutex::new(BoundedExpiringMap::new(capacity).with_default_ttl(ttl_ms)),
            max_cached_len,
            cache_hits: AtomicU64::new(0),
        }
    }

    // == Encode ==
    /// Encodes any serializable value.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T, confidential: bool) -> Result<Encoded> {
        let json = serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.encode_value(json, confidential)
    }

    pub fn encode_value(&self, value: Value, confidential: bool) -> Result<Encoded> {
        let kind = kind_of(&value);

        if kind.is_primitive() {
            let fingerprint = if confidential {
                None
            } else {
                self.fingerprint(&value, kind)
            };

            if let Some(fp) = &fingerprint {
                if let Some(text) = self.cache.lock().get(fp.as_str()) {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Encoded {
                        text: text.clone(),
                        kind,
                    });
                }
            }

            let text = encode_primitive(&value)?;
            if let Some(fp) = fingerprint {
                if text.len() <= self.max_cached_len {
                    self.cache.lock().set(fp, text.clone(), None);
                }
            }
            return Ok(Encoded { text, kind });
        }

        let (repaired, replaced) = cap_depth(value, 0);
        if replaced > 0 {
            warn!(
                "Replaced {} subtree(s) nested deeper than {} with '{}'",
                replaced, MAX_DEPTH, CIRCULAR_SENTINEL
            );
        }
        let text =
            serde_json::to_string(&repaired).map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(Encoded { text, kind })
    }

    // == Decode ==
    /// Decodes JSON text; failures are reported as corruption.
    pub fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| CacheError::Corrupted(e.to_string()))
    }

    // == Maintenance ==
    pub fn cleanup(&self) -> usize {
        self.cache.lock().cleanup()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    fn fingerprint(&self, value: &Value, kind: ValueKind) -> Option<String> {
        let raw = match value {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) if s.len() <= self.max_cached_len => s.clone(),
            _ => return None,
        };
        Some(format!("{}:{}", kind.tag(), raw))
    }
}

// == Helpers ==
pub fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(_) => ValueKind::Number,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

fn encode_primitive(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => {
            serde_json::to_string(s).map_err(|e| CacheError::Serialization(e.to_string()))
        }
        _ => Err(CacheError::Serialization(
            "container passed to primitive encoder".to_string(),
        )),
    }
}

/// Returns the value with every container below `MAX_DEPTH` replaced by
/// the sentinel, plus the number of replacements.
fn cap_depth(value: Value, depth: usize) -> (Value, usize) {
    match value {
        Value::Array(_) | Value::Object(_) if depth >= MAX_DEPTH => {
            (Value::String(CIRCULAR_SENTINEL.to_string()), 1)
        }
        Value::Array(items) => {
            let mut replaced = 0;
            let items = items
                .into_iter()
                .map(|item| {
                    let (item, n) = cap_depth(item, depth + 1);
                    replaced += n;
                    item
                })
                .collect();
            (Value::Array(items), replaced)
        }
        Value::Object(map) => {
            let mut replaced = 0;
            let map = map
                .into_iter()
                .map(|(k, v)| {
                    let (v, n) = cap_depth(v, depth + 1);
                    replaced += n;
                    (k, v)
                })
                .collect();
            (Value::Object(map), replaced)
        }
        other => (other, 0),
    }
}
