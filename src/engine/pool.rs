//! Pool coordinator: fan out workers, join them, and handle cancellation.
//!
//! The coordinator does no classification itself. It sizes the pool from the
//! proxy list, launches every worker against the same store, and waits. On
//! cancellation it gives workers a grace period to reach a loop boundary and
//! then aborts whatever is still running.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::worker::{Worker, WorkerCounters, WorkerExit, WorkerReport, WorkerStats};
use crate::error::Result;
use crate::store::{self, QueueStore};
use crate::verify::Verifier;

/// Configuration for a pool run.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent workers. Always at least one.
    pub workers: usize,
    /// Fixed delay before each verification, per worker.
    pub pacing: Duration,
    /// How long workers get to stop after cancellation before being aborted.
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            pacing: Duration::ZERO,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl PoolConfig {
    /// One worker per proxy endpoint, or a single worker with no proxies.
    pub fn for_proxies(proxy_count: usize) -> Self {
        Self {
            workers: proxy_count.max(1),
            ..Default::default()
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// A worker that stopped because of a store failure or a panic.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerFailure {
    /// `None` when the worker panicked and its index is unknown.
    pub worker: Option<usize>,
    pub error: String,
}

/// Summary of one pool run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workers: usize,
    /// `todo` cardinality when the run started.
    pub pending_at_start: u64,
    #[serde(flatten)]
    pub stats: WorkerStats,
    pub cancelled: bool,
    /// Workers still running after the grace period and aborted.
    pub aborted_workers: usize,
    pub worker_failures: Vec<WorkerFailure>,
}

impl RunReport {
    /// True when no worker stopped on a store failure or panic.
    pub fn is_clean(&self) -> bool {
        self.worker_failures.is_empty()
    }
}

/// Fans out workers over one shared queue store.
pub struct Pool {
    store: Arc<dyn QueueStore>,
    verifier: Arc<dyn Verifier>,
    config: PoolConfig,
}

impl Pool {
    pub fn new(store: Arc<dyn QueueStore>, verifier: Arc<dyn Verifier>, config: PoolConfig) -> Self {
        Self {
            store,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Run all workers until the queue drains or `cancel` fires.
    ///
    /// Cancellation is not an error: the report comes back with
    /// `cancelled = true` and whatever was classified stays in the store.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let workers = self.config.workers.max(1);
        let pending_at_start = store::stats(self.store.as_ref()).await?.todo;

        info!(
            %run_id,
            workers,
            pending = pending_at_start,
            pacing_ms = self.config.pacing.as_millis() as u64,
            "pool started"
        );

        // Workers watch a child token so aborting them never touches the caller's.
        let worker_cancel = cancel.child_token();
        let mut set = JoinSet::new();
        let mut counters = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker::new(
                id,
                Arc::clone(&self.store),
                Arc::clone(&self.verifier),
                self.config.pacing,
                worker_cancel.clone(),
            );
            counters.push(worker.counters());
            set.spawn(worker.run());
        }

        let mut tally = Tally::default();

        // Join until every worker is done or cancellation arrives.
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                joined = set.join_next() => match joined {
                    Some(joined) => tally.absorb(joined),
                    None => break false,
                },
            }
        };

        let mut aborted_workers = 0;
        if cancelled {
            info!(%run_id, grace_ms = self.config.shutdown_grace.as_millis() as u64, "cancellation requested, stopping workers");
            worker_cancel.cancel();

            let drained = tokio::time::timeout(self.config.shutdown_grace, async {
                while let Some(joined) = set.join_next().await {
                    tally.absorb(joined);
                }
            })
            .await;

            if drained.is_err() {
                aborted_workers = set.len();
                warn!(%run_id, aborted = aborted_workers, "workers did not stop within grace period, aborting");
                set.abort_all();
                while let Some(joined) = set.join_next().await {
                    tally.absorb(joined);
                }
            }
        }

        let stats = collect_stats(&counters);

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            workers,
            pending_at_start,
            stats,
            cancelled,
            aborted_workers,
            worker_failures: tally.failures,
        };

        info!(
            %run_id,
            accepted = report.stats.accepted,
            rejected = report.stats.rejected,
            verify_errors = report.stats.verify_errors,
            requeued = report.stats.requeued,
            lost = report.stats.lost,
            cancelled,
            failed_workers = report.worker_failures.len(),
            "pool finished"
        );
        Ok(report)
    }
}

/// Cancel `cancel` once `signal` resolves successfully.
///
/// If the signal cannot be listened for, the token is left alone and the
/// run simply cannot be interrupted.
pub fn cancel_on<F>(signal: F, cancel: CancellationToken) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("interrupt received, stopping workers");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for interrupts, run is not interruptible"),
        }
    })
}

/// Sum every worker's counters. An item a worker still holds after it
/// stopped (aborted, or failed on its classify write) is counted as lost.
fn collect_stats(counters: &[Arc<WorkerCounters>]) -> WorkerStats {
    let mut stats = WorkerStats::default();
    for worker in counters {
        stats.merge(&worker.snapshot());
        if worker.is_holding() {
            stats.lost += 1;
        }
    }
    stats
}

/// Collects worker failures as reports are joined.
#[derive(Default)]
struct Tally {
    failures: Vec<WorkerFailure>,
}

impl Tally {
    fn absorb(&mut self, joined: std::result::Result<WorkerReport, tokio::task::JoinError>) {
        match joined {
            Ok(report) => {
                if let WorkerExit::Failed(e) = report.exit {
                    self.failures.push(WorkerFailure {
                        worker: Some(report.worker),
                        error: e.to_string(),
                    });
                }
            }
            // Aborted after the grace period; its counters still hold its work.
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!(error = %e, "worker panicked");
                self.failures.push(WorkerFailure {
                    worker: None,
                    error: e.to_string(),
                });
            }
        }
    }
}
