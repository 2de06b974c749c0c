//! Expired-entry Sweep
//!
//! Background task that periodically purges expired entries from every
//! store of an engine, plus the engine's internal hint and encoding caches.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::CacheEngine;

/// Handle of a running sweep. Dropping it stops the sweep.
#[derive(Debug)]
pub struct CleanupTask {
    handle: JoinHandle<()>,
}

impl CleanupTask {
    /// Stops the sweep; a purge already in progress is abandoned.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a background task that purges expired entries every `interval`.
///
/// # Arguments
/// * `engine` - Shared engine to sweep
/// * `interval` - Time between two sweeps
///
/// # Example
/// ```ignore
/// let engine = Arc::new(CacheEngine::with_config(EngineConfig::default())?);
/// let cleanup = spawn_cleanup_task(engine.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup.stop();
/// ```
pub fn spawn_cleanup_task(engine: Arc<CacheEngine>, interval: Duration) -> CleanupTask {
    let handle = tokio::spawn(async move {
        info!("Starting expired-entry sweep every {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            match engine.purge_expired().await {
                Ok(0) => debug!("Sweep: no expired entries found"),
                Ok(removed) => info!("Sweep: removed {} expired entries", removed),
                Err(err) => warn!("Sweep failed: {}", err),
            }
        }
    });

    CleanupTask { handle }
}
