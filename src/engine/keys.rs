//! Key Transformation
//!
//! Caller keys become store keys by prefixing and then, optionally,
//! obfuscating. Listing keys back applies the inverse and drops anything
//! that does not belong to this engine.

use std::fmt::Debug;
use std::sync::Arc;

/// Reversible key obfuscation provided by the host application.
pub trait KeyObfuscator: Send + Sync + Debug {
    fn obfuscate(&self, key: &str) -> String;

    /// Inverse of `obfuscate`; None if `stored` was not produced by it.
    fn reveal(&self, stored: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct KeyTransformer {
    prefix: Option<String>,
    obfuscator: Option<Arc<dyn KeyObfuscator>>,
}

impl KeyTransformer {
    pub fn new(prefix: Option<String>, obfuscator: Option<Arc<dyn KeyObfuscator>>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
            obfuscator,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Whether store keys are distinguishable from foreign keys.
    pub fn is_scoped(&self) -> bool {
        self.prefix.is_some() || self.obfuscator.is_some()
    }

    /// Caller key -> store key.
    pub fn to_store(&self, key: &str) -> String {
        let prefixed = match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        };
        match &self.obfuscator {
            Some(obfuscator) => obfuscator.obfuscate(&prefixed),
            None => prefixed,
        }
    }

    /// Store key -> caller key, or None for keys this engine did not write.
    pub fn from_store(&self, stored: &str) -> Option<String> {
        let revealed = match &self.obfuscator {
            Some(obfuscator) => obfuscator.reveal(stored)?,
            None => stored.to_string(),
        };
        match &self.prefix {
            Some(prefix) => revealed.strip_prefix(prefix.as_str()).map(str::to_string),
            None => Some(revealed),
        }
    }
}
