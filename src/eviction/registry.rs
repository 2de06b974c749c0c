//! Strategy Registry
//!
//! Process-wide name -> constructor table. The seven built-in policies are
//! registered under their lowercase names on first use. Registering a name
//! that already exists replaces the previous constructor (last write wins),
//! built-in names included.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use super::{ArcStrategy, ArcTuning, EvictionStrategy, StrategyKind};
use crate::error::{CacheError, Result};

/// Builds a fresh strategy instance.
pub type StrategyConstructor = Arc<dyn Fn() -> EvictionStrategy + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Builtin(StrategyKind),
    Custom(StrategyConstructor),
}

impl Registration {
    /// Only the built-in `arc` entry takes `tuning`; custom constructors
    /// build whatever they were registered with.
    fn instantiate(&self, tuning: &ArcTuning) -> EvictionStrategy {
        match self {
            Registration::Builtin(StrategyKind::Arc) => {
                EvictionStrategy::Arc(Box::new(ArcStrategy::new(tuning.clone())))
            }
            Registration::Builtin(kind) => EvictionStrategy::new(*kind),
            Registration::Custom(constructor) => constructor(),
        }
    }
}

static REGISTRY: Lazy<RwLock<HashMap<String, Registration>>> = Lazy::new(|| {
    let table: HashMap<String, Registration> = StrategyKind::ALL
        .into_iter()
        .map(|kind| (kind.as_str().to_string(), Registration::Builtin(kind)))
        .collect();
    RwLock::new(table)
});

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

// == Strategy Registry ==
pub struct StrategyRegistry;

impl StrategyRegistry {
    /// Registers `constructor` under `name` (case-insensitive).
    pub fn register<F>(name: &str, constructor: F)
    where
        F: Fn() -> EvictionStrategy + Send + Sync + 'static,
    {
        let name = normalize(name);
        debug!("Registering eviction strategy '{}'", name);
        REGISTRY
            .write()
            .insert(name, Registration::Custom(Arc::new(constructor)));
    }

    /// Builds a new instance of the strategy registered under `name`.
    pub fn create(name: &str) -> Result<EvictionStrategy> {
        Self::create_tuned(name, &ArcTuning::default())
    }

    /// Like [`StrategyRegistry::create`], with `tuning` applied when `name`
    /// still resolves to the built-in `arc` policy.
    pub fn create_tuned(name: &str, tuning: &ArcTuning) -> Result<EvictionStrategy> {
        let name = normalize(name);
        let registration = REGISTRY
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| CacheError::Validation(format!("Unknown eviction policy: {name}")))?;
        Ok(registration.instantiate(tuning))
    }

    pub fn contains(name: &str) -> bool {
        REGISTRY.read().contains_key(&normalize(name))
    }

    /// Registered names, sorted.
    pub fn names() -> Vec<String> {
        let mut names: Vec<String> = REGISTRY.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        for kind in StrategyKind::ALL {
            let strategy = StrategyRegistry::create(kind.as_str()).unwrap();
            assert_eq!(strategy.kind(), kind);
        }
        assert!(StrategyRegistry::names().len() >= 7);
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let result = StrategyRegistry::create("no-such-policy");
        assert!(matches!(result, Err(CacheError::Validation(_))));
    }

    #[test]
    fn test_builtin_arc_takes_configured_tuning() {
        let tuning = ArcTuning {
            window: 25,
            ..ArcTuning::default()
        };
        match StrategyRegistry::create_tuned("ARC", &tuning).unwrap() {
            EvictionStrategy::Arc(arc) => assert_eq!(arc.tuning(), &tuning),
            other => panic!("expected arc, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_custom_constructor_ignores_tuning() {
        // the global table is shared by parallel tests, so "arc" itself is
        // not overridden here
        let custom = Registration::Custom(Arc::new(|| {
            EvictionStrategy::Arc(Box::new(ArcStrategy::new(ArcTuning {
                window: 3,
                ..ArcTuning::default()
            })))
        }));
        let tuning = ArcTuning {
            window: 25,
            ..ArcTuning::default()
        };
        match custom.instantiate(&tuning) {
            EvictionStrategy::Arc(arc) => assert_eq!(arc.tuning().window, 3),
            other => panic!("expected arc, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_register_custom_and_last_write_wins() {
        StrategyRegistry::register("registry-test-policy", || {
            EvictionStrategy::new(StrategyKind::Fifo)
        });
        assert_eq!(
            StrategyRegistry::create("Registry-Test-Policy").unwrap().kind(),
            StrategyKind::Fifo
        );

        StrategyRegistry::register("registry-test-policy", || {
            let tuning = ArcTuning {
                window: 10,
                ..ArcTuning::default()
            };
            EvictionStrategy::Arc(Box::new(ArcStrategy::new(tuning)))
        });
        assert!(StrategyRegistry::contains("registry-test-policy"));
        assert_eq!(
            StrategyRegistry::create("registry-test-policy").unwrap().kind(),
            StrategyKind::Arc
        );
    }
}
