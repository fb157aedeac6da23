//! Worker loop: pop, pace, verify, classify, repeat until `todo` is empty.
//!
//! A successful pop is the only authorization to process an item. Between
//! the pop and the classify write the item exists nowhere but in this task,
//! so a crash in that window loses it (at-most-once delivery).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{Item, SetName, Verdict};
use crate::store::QueueStore;
use crate::telemetry::item::{record_state_transition, start_item_span};
use crate::telemetry::metrics;
use crate::verify::Verifier;

/// Per-worker counters, summed by the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Verifications that failed and were therefore rejected.
    pub verify_errors: u64,
    /// Items interrupted by cancellation and returned to `todo`.
    pub requeued: u64,
    /// Items interrupted by cancellation that could not be returned.
    pub lost: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.verify_errors += other.verify_errors;
        self.requeued += other.requeued;
        self.lost += other.lost;
    }

    pub fn classified(&self) -> u64 {
        self.accepted + self.rejected
    }
}

/// Live counters for one worker.
///
/// Shared with the pool so the tally survives the worker task being aborted.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    verify_errors: AtomicU64,
    requeued: AtomicU64,
    lost: AtomicU64,
    /// Set from a successful pop until the item is in some set again.
    holding: AtomicBool,
}

impl WorkerCounters {
    pub fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            accepted: self.accepted.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            verify_errors: self.verify_errors.load(Ordering::SeqCst),
            requeued: self.requeued.load(Ordering::SeqCst),
            lost: self.lost.load(Ordering::SeqCst),
        }
    }

    /// True while the worker owns a popped item that is in no set.
    pub fn is_holding(&self) -> bool {
        self.holding.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn hold(&self, holding: bool) {
        self.holding.store(holding, Ordering::SeqCst);
    }
}

/// How a worker's loop ended.
#[derive(Debug)]
pub enum WorkerExit {
    /// `todo` was observed empty.
    Drained,
    /// The cancellation token fired.
    Cancelled,
    /// A queue store call failed; this worker stopped.
    Failed(Error),
}

/// What a worker hands back to the pool on exit.
#[derive(Debug)]
pub struct WorkerReport {
    pub worker: usize,
    pub stats: WorkerStats,
    pub exit: WorkerExit,
}

/// Result of processing one popped item.
enum Step {
    Classified(Verdict),
    Interrupted,
}

pub struct Worker {
    id: usize,
    store: Arc<dyn QueueStore>,
    verifier: Arc<dyn Verifier>,
    pacing: Duration,
    cancel: CancellationToken,
    counters: Arc<WorkerCounters>,
}

impl Worker {
    pub fn new(
        id: usize,
        store: Arc<dyn QueueStore>,
        verifier: Arc<dyn Verifier>,
        pacing: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            store,
            verifier,
            pacing,
            cancel,
            counters: Arc::default(),
        }
    }

    /// Handle onto this worker's counters, valid after the worker is gone.
    pub fn counters(&self) -> Arc<WorkerCounters> {
        Arc::clone(&self.counters)
    }

    /// Run until the queue is empty, the token is cancelled, or the store fails.
    pub async fn run(self) -> WorkerReport {
        debug!(worker = self.id, "worker started");
        let exit = loop {
            if self.cancel.is_cancelled() {
                break WorkerExit::Cancelled;
            }

            let item = match self.store.pop(SetName::Todo).await {
                Ok(Some(item)) => {
                    self.counters.hold(true);
                    item
                }
                Ok(None) => break WorkerExit::Drained,
                Err(e) => {
                    error!(worker = self.id, error = %e, "queue pop failed, worker stopping");
                    break WorkerExit::Failed(e);
                }
            };

            let span = start_item_span(self.id, &item);
            match self.process(&item, &span).instrument(span.clone()).await {
                Ok(Step::Classified(verdict)) => {
                    span.record("item.verdict", verdict.as_str());
                }
                Ok(Step::Interrupted) => {
                    self.release(item).await;
                    break WorkerExit::Cancelled;
                }
                Err(e) => {
                    error!(
                        worker = self.id,
                        item = %item,
                        error = %e,
                        "classification write failed, item lost, worker stopping"
                    );
                    break WorkerExit::Failed(e);
                }
            }
        };

        let stats = self.counters.snapshot();
        match exit {
            WorkerExit::Drained => info!(worker = self.id, ?stats, "worker drained queue"),
            WorkerExit::Cancelled => info!(worker = self.id, ?stats, "worker cancelled"),
            WorkerExit::Failed(_) => {}
        }

        WorkerReport {
            worker: self.id,
            stats,
            exit,
        }
    }

    /// Pacing → Verifying → Classifying for one popped item.
    async fn process(&self, item: &Item, span: &tracing::Span) -> Result<Step> {
        if !self.pacing.is_zero() {
            record_state_transition(span, "popping", "pacing");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Step::Interrupted),
                _ = tokio::time::sleep(self.pacing) => {}
            }
        }

        record_state_transition(span, "pacing", "verifying");
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Step::Interrupted),
            outcome = self.verifier.verify(item) => outcome,
        };

        let verdict = match outcome {
            Ok(success) => Verdict::from(success),
            Err(e) => {
                warn!(worker = self.id, item = %item, error = %e, "verification failed");
                metrics::verify_errors().add(1, &[KeyValue::new("kind", e.kind())]);
                WorkerCounters::bump(&self.counters.verify_errors);
                Verdict::Rejected
            }
        };
        metrics::verify_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("verdict", verdict.as_str())],
        );

        // Never cancelled: once verified, the verdict must reach the store.
        record_state_transition(span, "verifying", "classifying");
        self.store.add(verdict.destination(), item).await?;
        metrics::items_classified().add(1, &[KeyValue::new("verdict", verdict.as_str())]);
        self.counters.hold(false);
        match verdict {
            Verdict::Accepted => WorkerCounters::bump(&self.counters.accepted),
            Verdict::Rejected => WorkerCounters::bump(&self.counters.rejected),
        }
        debug!(worker = self.id, item = %item, verdict = verdict.as_str(), "classified");
        Ok(Step::Classified(verdict))
    }

    /// Return an unclassified item to `todo` after cancellation.
    async fn release(&self, item: Item) {
        match self.store.add(SetName::Todo, &item).await {
            Ok(()) => {
                info!(worker = self.id, item = %item, "interrupted item returned to queue");
                metrics::items_abandoned().add(1, &[KeyValue::new("result", "requeued")]);
                WorkerCounters::bump(&self.counters.requeued);
            }
            Err(e) => {
                warn!(worker = self.id, item = %item, error = %e, "interrupted item lost");
                metrics::items_abandoned().add(1, &[KeyValue::new("result", "lost")]);
                WorkerCounters::bump(&self.counters.lost);
            }
        }
        self.counters.hold(false);
    }
}
