//! Batch Pipeline Module
//!
//! Runs an async operation over a list of items in fixed-size groups with
//! bounded concurrency, per-attempt timeouts and exponential-backoff
//! retries. One item's failure never affects its siblings: the report
//! always splits completed results from failed items.
//!
//! Two modes:
//! - [`BatchMode::Ordered`]: groups run one after another, items inside a
//!   group run concurrently; completed results come back in input order.
//! - [`BatchMode::Throughput`]: up to `concurrency` groups in flight;
//!   completion order is not guaranteed.
//!
//! A timed-out attempt is reported as failed and its future is dropped.
//! Side effects the operation already issued (a write that reached a
//! store, say) may still land.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};

// == Batch Mode ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Ordered,
    Throughput,
}

// == Batch Config ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items per group
    pub batch_size: usize,
    /// Groups in flight at once (throughput mode)
    pub concurrency: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_base_delay_ms: u64,
    /// Deadline of a single attempt
    pub item_timeout_ms: u64,
    pub mode: BatchMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 4,
            max_retries: 2,
            retry_base_delay_ms: 50,
            item_timeout_ms: 5_000,
            mode: BatchMode::Ordered,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CacheError::Validation("batch_size must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(CacheError::Validation("concurrency must be at least 1".to_string()));
        }
        if self.item_timeout_ms == 0 {
            return Err(CacheError::Validation("item_timeout_ms must be at least 1".to_string()));
        }
        Ok(())
    }
}

// == Batch Task ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Lifecycle record of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTask {
    pub index: usize,
    pub retry_count: u32,
    pub status: TaskStatus,
}

// == Report Types ==
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub attempts: u32,
    pub error: CacheError,
}

/// Snapshot published after every group.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// Extrapolated from throughput so far; None before any item finished
    pub eta: Option<Duration>,
}

impl BatchProgress {
    pub fn processed(&self) -> usize {
        self.completed + self.failed
    }
}

#[derive(Debug)]
pub struct BatchReport<R> {
    /// (input index, result) of every completed item
    pub completed: Vec<(usize, R)>,
    pub failed: Vec<BatchFailure>,
    /// Final lifecycle record of every item, in input order
    pub tasks: Vec<BatchTask>,
    pub elapsed: Duration,
    /// Items per second
    pub throughput: f64,
}

impl<R> BatchReport<R> {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

struct ItemOutcome<R> {
    index: usize,
    attempts: u32,
    result: Result<R>,
}

// == Batch Pipeline ==
#[derive(Debug, Clone, Default)]
pub struct BatchPipeline {
    config: BatchConfig,
}

impl BatchPipeline {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Runs `op` over `items` without progress reporting.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, op: F) -> Result<BatchReport<R>>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.run_with_progress(items, op, |_| {}).await
    }

    /// Runs `op` over `items`, calling `progress` after every group.
    ///
    /// Only an invalid configuration fails the whole call; item failures
    /// are collected in the report.
    pub async fn run_with_progress<T, R, F, Fut, P>(
        &self,
        items: Vec<T>,
        op: F,
        progress: P,
    ) -> Result<BatchReport<R>>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>>,
        P: Fn(&BatchProgress),
    {
        self.config.validate()?;

        let started = Instant::now();
        let total = items.len();
        let mut tasks: Vec<BatchTask> = (0..total)
            .map(|index| BatchTask {
                index,
                retry_count: 0,
                status: TaskStatus::Pending,
            })
            .collect();

        let groups = chunk(items, self.config.batch_size);
        let op = &op;
        let run_group = |group: Vec<(usize, T)>| {
            join_all(
                group
                    .into_iter()
                    .map(move |(index, item)| self.attempt(index, item, op)),
            )
        };

        let mut completed = Vec::with_capacity(total);
        let mut failed = Vec::new();

        match self.config.mode {
            BatchMode::Ordered => {
                for group in groups {
                    for (index, _) in &group {
                        if let Some(task) = tasks.get_mut(*index) {
                            task.status = TaskStatus::Running;
                        }
                    }
                    let outcomes = run_group(group).await;
                    record(outcomes, &mut tasks, &mut completed, &mut failed);
                    progress(&snapshot(total, &completed, &failed, started));
                }
            }
            BatchMode::Throughput => {
                // every group is handed to the stream up front
                for task in &mut tasks {
                    task.status = TaskStatus::Running;
                }
                let mut in_flight = stream::iter(groups)
                    .map(run_group)
                    .buffer_unordered(self.config.concurrency);
                while let Some(outcomes) = in_flight.next().await {
                    record(outcomes, &mut tasks, &mut completed, &mut failed);
                    progress(&snapshot(total, &completed, &failed, started));
                }
            }
        }

        if self.config.mode == BatchMode::Ordered {
            completed.sort_by_key(|(index, _)| *index);
        }
        failed.sort_by_key(|failure| failure.index);

        let elapsed = started.elapsed();
        let throughput = if elapsed.as_secs_f64() > 0.0 {
            total as f64 / elapsed.as_secs_f64()
        } else {
            total as f64
        };

        debug!(
            "Batch finished: {} completed, {} failed in {:?}",
            completed.len(),
            failed.len(),
            elapsed
        );

        Ok(BatchReport {
            completed,
            failed,
            tasks,
            elapsed,
            throughput,
        })
    }

    // == Attempt ==
    /// Runs one item with timeout and exponential-backoff retries.
    async fn attempt<T, R, F, Fut>(&self, index: usize, item: T, op: &F) -> ItemOutcome<R>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let deadline = Duration::from_millis(self.config.item_timeout_ms);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = match timeout(deadline, op(item.clone())).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout(deadline)),
            };

            match result {
                Ok(value) => {
                    return ItemOutcome {
                        index,
                        attempts,
                        result: Ok(value),
                    }
                }
                Err(err) if attempts <= self.config.max_retries => {
                    let delay = self.backoff(attempts - 1);
                    debug!(
                        "Batch item {} attempt {} failed ({}), retrying in {:?}",
                        index, attempts, err, delay
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    warn!("Batch item {} failed after {} attempt(s): {}", index, attempts, err);
                    return ItemOutcome {
                        index,
                        attempts,
                        result: Err(err),
                    };
                }
            }
        }
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(20)).unwrap_or(u64::MAX);
        Duration::from_millis(self.config.retry_base_delay_ms.saturating_mul(factor))
    }
}

// == Helpers ==
fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<(usize, T)>> {
    let mut groups = Vec::new();
    let mut current = Vec::with_capacity(size);
    for pair in items.into_iter().enumerate() {
        current.push(pair);
        if current.len() == size {
            groups.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn record<R>(
    outcomes: Vec<ItemOutcome<R>>,
    tasks: &mut [BatchTask],
    completed: &mut Vec<(usize, R)>,
    failed: &mut Vec<BatchFailure>,
) {
    for outcome in outcomes {
        let retry_count = outcome.attempts.saturating_sub(1);
        let status = match outcome.result {
            Ok(value) => {
                completed.push((outcome.index, value));
                TaskStatus::Completed
            }
            Err(err) => {
                failed.push(BatchFailure {
                    index: outcome.index,
                    attempts: outcome.attempts,
                    error: CacheError::BatchItem {
                        index: outcome.index,
                        attempts: outcome.attempts,
                        reason: err.to_string(),
                    },
                });
                TaskStatus::Failed
            }
        };
        if let Some(task) = tasks.get_mut(outcome.index) {
            task.retry_count = retry_count;
            task.status = status;
        }
    }
}

fn snapshot<R>(
    total: usize,
    completed: &[(usize, R)],
    failed: &[BatchFailure],
    started: Instant,
) -> BatchProgress {
    let elapsed = started.elapsed();
    let processed = completed.len() + failed.len();
    let eta = if processed == 0 {
        None
    } else {
        let per_item = elapsed.as_secs_f64() / processed as f64;
        let remaining = total.saturating_sub(processed) as f64;
        Some(Duration::from_secs_f64(per_item * remaining))
    };
    BatchProgress {
        total,
        completed: completed.len(),
        failed: failed.len(),
        elapsed,
        eta,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn fast_config(mode: BatchMode) -> BatchConfig {
        BatchConfig {
            batch_size: 3,
            concurrency: 2,
            max_retries: 2,
            retry_base_delay_ms: 1,
            item_timeout_ms: 200,
            mode,
        }
    }

    #[tokio::test]
    async fn test_ordered_mode_preserves_positions() {
        let pipeline = BatchPipeline::new(fast_config(BatchMode::Ordered));
        let items: Vec<u64> = (0..10).collect();

        let report = pipeline
            .run(items, |n| async move {
                // later items finish first
                tokio::time::sleep(Duration::from_millis(10 - n)).await;
                Ok(n * 2)
            })
            .await
            .unwrap();

        let expected: Vec<(usize, u64)> = (0..10).map(|n| (n as usize, n * 2)).collect();
        assert_eq!(report.completed, expected);
        assert!(report.is_complete_success());
        assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_throughput_mode_completes_everything() {
        let pipeline = BatchPipeline::new(fast_config(BatchMode::Throughput));
        let items: Vec<u32> = (0..20).collect();

        let report = pipeline.run(items, |n| async move { Ok(n) }).await.unwrap();

        let indices: HashSet<usize> = report.completed.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices.len(), 20);
        assert_eq!(report.total(), 20);
        assert!(report.throughput > 0.0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let pipeline = BatchPipeline::new(fast_config(BatchMode::Ordered));
        let items: Vec<u32> = (0..9).collect();

        let report = pipeline
            .run(items, |n| async move {
                if n % 3 == 0 {
                    Err(CacheError::store_io("test", format!("item {n} rejected")))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(report.completed.len(), 6);
        assert_eq!(report.failed.len(), 3);
        let failed: Vec<usize> = report.failed.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![0, 3, 6]);
        assert!(report.failed.iter().all(|f| f.attempts == 3));
        assert!(matches!(report.failed[0].error, CacheError::BatchItem { index: 0, .. }));
        assert_eq!(report.tasks[3].status, TaskStatus::Failed);
        assert_eq!(report.tasks[3].retry_count, 2);
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failure() {
        let pipeline = BatchPipeline::new(fast_config(BatchMode::Ordered));
        let attempts: Mutex<HashMap<u32, u32>> = Mutex::new(HashMap::new());

        let report = pipeline
            .run(vec![1u32, 2], |n| {
                let seen = {
                    let mut map = attempts.lock().unwrap();
                    let count = map.entry(n).or_insert(0);
                    *count += 1;
                    *count
                };
                async move {
                    if n == 2 && seen < 3 {
                        Err(CacheError::Timeout(Duration::from_millis(1)))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(report.completed, vec![(0, 1), (1, 2)]);
        assert_eq!(report.tasks[1].retry_count, 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let config = BatchConfig {
            max_retries: 0,
            item_timeout_ms: 20,
            ..fast_config(BatchMode::Ordered)
        };
        let pipeline = BatchPipeline::new(config);

        let report = pipeline
            .run(vec![0u64, 100], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            })
            .await
            .unwrap();

        assert_eq!(report.completed, vec![(0, 0)]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].error.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_progress_after_every_group() {
        let pipeline = BatchPipeline::new(fast_config(BatchMode::Ordered));
        let snapshots = Mutex::new(Vec::new());

        pipeline
            .run_with_progress(
                (0..7).collect::<Vec<u32>>(),
                |n| async move { Ok(n) },
                |p| snapshots.lock().unwrap().push(p.clone()),
            )
            .await
            .unwrap();

        let snapshots = snapshots.into_inner().unwrap();
        let processed: Vec<usize> = snapshots.iter().map(|p| p.processed()).collect();
        assert_eq!(processed, vec![3, 6, 7]);
        assert_eq!(snapshots.last().unwrap().eta, Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let pipeline = BatchPipeline::new(BatchConfig {
            batch_size: 0,
            ..BatchConfig::default()
        });
        let result = pipeline.run(vec![1u32], |n| async move { Ok(n) }).await;
        assert!(matches!(result, Err(CacheError::Validation(_))));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let pipeline = BatchPipeline::default();
        let calls = AtomicU32::new(0);
        let report = pipeline
            .run(Vec::<u32>::new(), |n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n) }
            })
            .await
            .unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backoff_doubles() {
        let pipeline = BatchPipeline::new(BatchConfig {
            retry_base_delay_ms: 10,
            ..BatchConfig::default()
        });
        assert_eq!(pipeline.backoff(0), Duration::from_millis(10));
        assert_eq!(pipeline.backoff(1), Duration::from_millis(20));
        assert_eq!(pipeline.backoff(3), Duration::from_millis(80));
    }
}
