// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async job queue: bounded FIFO admission feeding a fixed worker pool.
//!
//! Workers claim jobs strictly in submission order and drive the backing
//! run through the manager. Shutdown is two-phase: close admission and
//! drain, then broadcast cancellation to whatever is still running.

use crate::manager::{Manager, ManagerError};
use crate::store::JobStore;
use parking_lot::Mutex;
use pulse_core::metrics::QueueMetrics;
use pulse_core::{ErrorKind, Job, JobStatus, RunId, RunState, SharedClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Queue shape, fixed at construction.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub workers: usize,
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { workers: 4, capacity: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is stopped")]
    Stopped,

    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job '{0}' is already terminal")]
    AlreadyTerminal(String),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Stopped => ErrorKind::Unavailable,
            QueueError::NotFound(_) => ErrorKind::NotFound,
            QueueError::AlreadyTerminal(_) => ErrorKind::Conflict,
        }
    }
}

/// Result of a two-phase shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Every worker exited within the drain deadline.
    Drained,
    /// The deadline hit first; remaining runs were signalled to cancel.
    TimedOut,
}

/// One page of job records, most recent first.
#[derive(Debug, Clone)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

struct QueueInner {
    store: Arc<dyn JobStore>,
    manager: Manager,
    clock: SharedClock,
    metrics: QueueMetrics,
    config: QueueConfig,
    tx: Mutex<Option<mpsc::Sender<RunId>>>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<RunId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Cloneable queue handle.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new(
        manager: Manager,
        store: Arc<dyn JobStore>,
        clock: SharedClock,
        metrics: QueueMetrics,
        config: QueueConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        Self {
            inner: Arc::new(QueueInner {
                store,
                manager,
                clock,
                metrics,
                config,
                tx: Mutex::new(Some(tx)),
                rx: Arc::new(tokio::sync::Mutex::new(rx)),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn exactly the configured number of workers. Idempotent.
    pub fn start(&self) {
        let mut workers = self.inner.workers.lock();
        if !workers.is_empty() {
            return;
        }
        for worker in 0..self.inner.config.workers.max(1) {
            let inner = Arc::clone(&self.inner);
            workers.push(tokio::spawn(worker_loop(inner, worker)));
        }
        debug!(workers = workers.len(), "queue started");
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.tx.lock().is_some()
    }

    /// Whether the worker pool has been spawned and not yet drained.
    pub fn is_running(&self) -> bool {
        !self.inner.workers.lock().is_empty()
    }

    /// Enqueue a run. The job id equals the run id.
    pub async fn submit(&self, run_id: RunId) -> Result<RunId, QueueError> {
        let tx = self.inner.tx.lock().clone().ok_or(QueueError::Stopped)?;

        self.inner.store.insert(Job::new(run_id, self.inner.clock.epoch_ms()));
        if tx.send(run_id).await.is_err() {
            // Admission closed between the check and the send.
            let epoch = self.inner.clock.epoch_ms();
            self.inner.store.update(run_id.as_str(), &mut |job| {
                let _ = job.finish(JobStatus::Cancelled, epoch);
            });
            return Err(QueueError::Stopped);
        }
        Ok(run_id)
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.inner.store.get(id)
    }

    /// Page through job records, newest first, optionally filtered.
    pub fn list(&self, status: Option<JobStatus>, page: usize, page_size: usize) -> JobPage {
        let mut jobs = self.inner.store.list();
        jobs.reverse();
        if let Some(status) = status {
            jobs.retain(|j| j.status == status);
        }

        let total = jobs.len();
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);
        let start = (page - 1).saturating_mul(page_size).min(total);
        let end = start.saturating_add(page_size).min(total);

        JobPage { items: jobs[start..end].to_vec(), total, page, page_size }
    }

    /// Cancel a job: a queued one is finalized in place, a running one
    /// forwards the cancel to the manager.
    pub fn cancel(&self, id: &str) -> Result<(), QueueError> {
        let job = self.inner.store.get(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal(id.to_string()));
        }

        match job.status {
            JobStatus::Queued => {
                let epoch = self.inner.clock.epoch_ms();
                self.inner.store.update(id, &mut |job| {
                    let _ = job.finish(JobStatus::Cancelled, epoch);
                });
                self.inner.metrics.record_finished("cancelled");
                // Finalizes the pending run and emits its terminal events.
                match self.inner.manager.cancel(id) {
                    Ok(()) | Err(ManagerError::AlreadyTerminal(_)) => Ok(()),
                    Err(err) => {
                        warn!(job = id, %err, "run cancel failed for queued job");
                        Ok(())
                    }
                }
            }
            _ => match self.inner.manager.cancel(id) {
                Ok(()) | Err(ManagerError::AlreadyTerminal(_)) => Ok(()),
                Err(ManagerError::RunNotFound(_)) => Err(QueueError::NotFound(id.to_string())),
                Err(err) => {
                    warn!(job = id, %err, "run cancel failed");
                    Ok(())
                }
            },
        }
    }

    /// Drop the store record for a pruned run.
    pub fn remove_record(&self, id: &str) -> Option<Job> {
        self.inner.store.remove(id)
    }

    /// Two-phase shutdown. Closes admission, drains up to `deadline`,
    /// then broadcasts cancellation and waits once more.
    pub async fn stop(&self, deadline: Duration) -> StopOutcome {
        self.inner.tx.lock().take();
        let handles: Vec<JoinHandle<()>> = self.inner.workers.lock().drain(..).collect();

        let deadline_at = tokio::time::Instant::now() + deadline;
        let pending = join_until(handles, deadline_at).await;
        if pending.is_empty() {
            debug!("queue drained");
            return StopOutcome::Drained;
        }

        warn!(stuck_workers = pending.len(), "drain deadline hit, cancelling live runs");
        self.inner.manager.cancel_all(deadline).await;
        let deadline_at = tokio::time::Instant::now() + deadline;
        let still_pending = join_until(pending, deadline_at).await;
        if !still_pending.is_empty() {
            warn!(stuck_workers = still_pending.len(), "workers did not exit after cancel");
        }
        StopOutcome::TimedOut
    }
}

/// Join handles until the deadline; returns those still running.
async fn join_until(
    handles: Vec<JoinHandle<()>>,
    deadline_at: tokio::time::Instant,
) -> Vec<JoinHandle<()>> {
    let mut remaining = Vec::new();
    for mut handle in handles {
        if tokio::time::Instant::now() >= deadline_at {
            remaining.push(handle);
            continue;
        }
        if tokio::time::timeout_at(deadline_at, &mut handle).await.is_err() {
            remaining.push(handle);
        }
    }
    remaining
}

async fn worker_loop(inner: Arc<QueueInner>, worker: usize) {
    loop {
        let run_id = {
            let mut rx = inner.rx.lock().await;
            rx.recv().await
        };
        let Some(run_id) = run_id else { break };

        // Claim. A job cancelled while queued is already terminal and is
        // skipped without touching the run.
        let epoch = inner.clock.epoch_ms();
        let claimed = inner.store.update(run_id.as_str(), &mut |job| {
            let _ = job.mark_running(epoch);
        });
        match claimed {
            Some(job) if job.status == JobStatus::Running => {}
            Some(_) => continue,
            None => {
                warn!(worker, run_id = %run_id, "dequeued job without a store record");
                continue;
            }
        }

        debug!(worker, run_id = %run_id, "job claimed");
        inner.metrics.jobs_running.inc();

        inner.manager.execute(&run_id).await;

        let state = inner
            .manager
            .snapshot(run_id.as_str())
            .map(|run| run.state)
            .unwrap_or(RunState::Failed);
        let mut status = JobStatus::from(state);
        if !status.is_terminal() {
            warn!(worker, run_id = %run_id, %state, "run ended non-terminal, recording failure");
            status = JobStatus::Failed;
        }

        let epoch = inner.clock.epoch_ms();
        inner.store.update(run_id.as_str(), &mut |job| {
            let _ = job.finish(status, epoch);
        });
        inner.metrics.jobs_running.dec();
        inner.metrics.record_finished(&status.to_string());
    }
    debug!(worker, "worker exited");
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
