//! Tiered Cache - demo runner
//!
//! Builds an engine from environment configuration with a memory tier and
//! an in-process stand-in for the local tier, runs a short workload, then
//! keeps the expired-entry sweep alive until Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::storage::LOCAL;
use tiered_cache::{
    spawn_cleanup_task, CacheEngine, EngineConfig, MemoryStore, RememberOptions, SetOptions,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Profile {
    id: u32,
    name: String,
    roles: Vec<String>,
}

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the engine and start the expired-entry sweep
/// 4. Run the demo workload and log the resulting stats
/// 5. Wait for Ctrl+C, then stop the sweep
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tiered Cache demo");

    let config = EngineConfig::from_env();
    info!(
        "Configuration loaded: memory_capacity={}, eviction_policy={}, cleanup_interval={}ms, selection={:?}",
        config.memory_capacity, config.eviction_policy, config.cleanup_interval_ms, config.selection
    );

    let local = MemoryStore::with_policy(LOCAL, config.memory_capacity * 10, "lru")
        .context("building local tier")?;
    let cleanup_interval = Duration::from_millis(config.cleanup_interval_ms);
    let engine = Arc::new(
        CacheEngine::builder(config)
            .store(Arc::new(local))
            .build()
            .context("building cache engine")?,
    );

    let cleanup = spawn_cleanup_task(engine.clone(), cleanup_interval);
    info!("Background sweep started");

    run_workload(&engine).await?;

    let stats = serde_json::to_string_pretty(&engine.stats())?;
    info!("Engine stats:\n{}", stats);

    info!("Press Ctrl+C to exit");
    signal::ctrl_c()
        .await
        .context("installing Ctrl+C handler")?;

    cleanup.stop();
    warn!("Background sweep stopped");
    info!("Shutdown complete");
    Ok(())
}

async fn run_workload(engine: &CacheEngine) -> anyhow::Result<()> {
    let ada = Profile {
        id: 1,
        name: "ada".to_string(),
        roles: vec!["admin".to_string()],
    };

    engine.set("profile:1", &ada, &SetOptions::store(LOCAL)).await?;
    engine.set("greeting", "hello", &SetOptions::ttl(30_000)).await?;

    // local hit, promoted to memory in the background
    let profile: Option<Profile> = engine.get("profile:1").await?;
    info!("profile:1 -> {:?}", profile);

    let items: Vec<(String, u32)> = (0..20).map(|n| (format!("counter:{n}"), n)).collect();
    let written = engine.mset(&items, &SetOptions::default()).await?;
    info!(
        "mset: {} stored, {} failed",
        written.succeeded.len(),
        written.failed.len()
    );

    let keys: Vec<String> = (0..25).map(|n| format!("counter:{n}")).collect();
    let counters: Vec<Option<u32>> = engine.mget(&keys).await?;
    info!(
        "mget: {} of {} found",
        counters.iter().filter(|c| c.is_some()).count(),
        keys.len()
    );

    let answer: u64 = engine
        .remember(
            "answer",
            || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(42)
            },
            &RememberOptions::default(),
        )
        .await?;
    info!("answer -> {}", answer);

    engine.remove("greeting").await?;
    info!("Keys now cached: {}", engine.keys().await?.len());
    Ok(())
}
