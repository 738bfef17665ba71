// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation manager: definition registry, run instantiation, and the
//! staged execution loop.
//!
//! The manager owns every run. Observers get deep-copy snapshots; steps
//! reach back only through ids and the reporter's progress hook.

use crate::bus::EventBus;
use crate::context::OperationContext;
use crate::definition::OperationDefinition;
use crate::reporter::{ProgressHook, Reporter};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use pulse_core::{
    Envelope, ErrorKind, Event, LogLevel, Run, RunId, RunState, SharedClock, StepError, TraceId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tunables for run execution.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Budget for a whole run; each step's deadline is bounded by what
    /// remains of it.
    pub operation_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { operation_timeout: Duration::from_secs(300) }
    }
}

/// Errors from the manager's public contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("operation '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("run '{0}' not found")]
    RunNotFound(String),

    #[error("run '{0}' is already terminal")]
    AlreadyTerminal(String),

    #[error("run '{0}' is not terminal")]
    NotTerminal(String),
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::AlreadyRegistered(_) => ErrorKind::Conflict,
            ManagerError::UnknownOperation(_) => ErrorKind::NotFound,
            ManagerError::InvalidParams(_) => ErrorKind::Validation,
            ManagerError::RunNotFound(_) => ErrorKind::NotFound,
            ManagerError::AlreadyTerminal(_) => ErrorKind::Conflict,
            ManagerError::NotTerminal(_) => ErrorKind::Conflict,
        }
    }
}

struct RunEntry {
    run: Run,
    cancel: CancellationToken,
    trace_id: TraceId,
}

struct ManagerInner {
    definitions: RwLock<IndexMap<String, Arc<OperationDefinition>>>,
    runs: RwLock<IndexMap<RunId, RunEntry>>,
    bus: EventBus,
    clock: SharedClock,
    config: ManagerConfig,
}

/// Cloneable handle; all clones share one run set.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    pub fn new(bus: EventBus, clock: SharedClock, config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                definitions: RwLock::new(IndexMap::new()),
                runs: RwLock::new(IndexMap::new()),
                bus,
                clock,
                config,
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Register an operation definition. Ids are unique for the process
    /// lifetime.
    pub fn register(&self, def: OperationDefinition) -> Result<(), ManagerError> {
        let mut defs = self.inner.definitions.write();
        if defs.contains_key(def.id()) {
            return Err(ManagerError::AlreadyRegistered(def.id().to_string()));
        }
        debug!(definition = def.id(), steps = def.steps().len(), "registered operation");
        defs.insert(def.id().to_string(), Arc::new(def));
        Ok(())
    }

    /// Registered `(id, name)` pairs, in registration order.
    pub fn definitions(&self) -> Vec<(String, String)> {
        self.inner
            .definitions
            .read()
            .values()
            .map(|d| (d.id().to_string(), d.name().to_string()))
            .collect()
    }

    /// Create a pending run. Returns immediately; execution happens when a
    /// queue worker picks the run up.
    pub fn start(
        &self,
        definition_id: &str,
        params: serde_json::Value,
        trace_id: TraceId,
    ) -> Result<RunId, ManagerError> {
        let def = {
            let defs = self.inner.definitions.read();
            defs.get(definition_id)
                .cloned()
                .ok_or_else(|| ManagerError::UnknownOperation(definition_id.to_string()))?
        };

        let params = match params {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            obj @ serde_json::Value::Object(_) => obj,
            other => {
                return Err(ManagerError::InvalidParams(format!(
                    "expected a JSON object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let run_id = RunId::new();
        let run = Run::new(
            run_id,
            definition_id,
            def.step_labels(),
            params,
            self.inner.clock.epoch_ms(),
        );

        let mut runs = self.inner.runs.write();
        runs.insert(run_id, RunEntry { run, cancel: CancellationToken::new(), trace_id });
        Ok(run_id)
    }

    /// Request cancellation. Idempotent while the run is live; running
    /// steps observe the token at their next suspension point.
    pub fn cancel(&self, run_id: &str) -> Result<(), ManagerError> {
        let finalized = {
            let mut runs = self.inner.runs.write();
            let entry = runs
                .get_mut(run_id)
                .ok_or_else(|| ManagerError::RunNotFound(run_id.to_string()))?;
            if entry.run.is_terminal() {
                return Err(ManagerError::AlreadyTerminal(run_id.to_string()));
            }
            entry.cancel.cancel();

            // A run that no worker has claimed yet ends right here.
            if entry.run.state == RunState::Pending {
                let epoch = self.inner.clock.epoch_ms();
                entry.run.cancel_remaining_steps(epoch);
                let _ = entry.run.transition(RunState::Cancelled, epoch);
                Some((entry.run.clone(), entry.trace_id))
            } else {
                None
            }
        };

        if let Some((run, trace_id)) = finalized {
            self.emit(Event::OperationCancelled { run_id: run.id }, trace_id);
            self.emit(Event::OperationSnapshot { run_id: run.id, run }, trace_id);
        }
        Ok(())
    }

    /// Signal every non-terminal run, then wait until they all settle or
    /// the deadline elapses. Returns how many runs were signalled.
    pub async fn cancel_all(&self, deadline: Duration) -> usize {
        let live: Vec<RunId> = {
            let runs = self.inner.runs.read();
            runs.values().filter(|e| !e.run.is_terminal()).map(|e| e.run.id).collect()
        };
        for id in &live {
            let _ = self.cancel(id.as_str());
        }

        let deadline_at = tokio::time::Instant::now() + deadline;
        while tokio::time::Instant::now() < deadline_at {
            let all_settled = {
                let runs = self.inner.runs.read();
                live.iter().all(|id| {
                    runs.get(id.as_str()).map(|e| e.run.is_terminal()).unwrap_or(true)
                })
            };
            if all_settled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        live.len()
    }

    /// Deep-copy snapshot of a run.
    pub fn snapshot(&self, run_id: &str) -> Option<Run> {
        self.inner.runs.read().get(run_id).map(|e| e.run.clone())
    }

    /// All runs, most recent first.
    pub fn list(&self) -> Vec<Run> {
        self.inner.runs.read().values().rev().map(|e| e.run.clone()).collect()
    }

    /// Remove a terminal run.
    pub fn prune(&self, run_id: &str) -> Result<(), ManagerError> {
        let mut runs = self.inner.runs.write();
        let entry =
            runs.get(run_id).ok_or_else(|| ManagerError::RunNotFound(run_id.to_string()))?;
        if !entry.run.is_terminal() {
            return Err(ManagerError::NotTerminal(run_id.to_string()));
        }
        runs.shift_remove(run_id);
        Ok(())
    }

    /// Drive a run to a terminal state. Called from a queue worker; never
    /// panics outward.
    pub async fn execute(&self, run_id: &RunId) {
        let Some((definition_id, cancel, trace_id)) = ({
            let runs = self.inner.runs.read();
            runs.get(run_id.as_str())
                .map(|e| (e.run.definition_id.clone(), e.cancel.clone(), e.trace_id))
        }) else {
            warn!(run_id = %run_id, "execute called for unknown run");
            return;
        };

        let Some(def) = self.inner.definitions.read().get(&definition_id).cloned() else {
            self.fail_run(run_id, StepError::internal("definition not registered"), trace_id);
            return;
        };

        // Claim: pending -> running. A run cancelled while queued is
        // already terminal and needs no work.
        let params = {
            let mut runs = self.inner.runs.write();
            let Some(entry) = runs.get_mut(run_id.as_str()) else { return };
            if entry.run.is_terminal() {
                return;
            }
            let epoch = self.inner.clock.epoch_ms();
            if let Err(err) = entry.run.transition(RunState::Running, epoch) {
                warn!(run_id = %run_id, %err, "run not startable");
                return;
            }
            Arc::new(entry.run.params.clone())
        };
        self.emit(
            Event::OperationStarted { run_id: *run_id, definition_id: definition_id.clone() },
            trace_id,
        );

        let shared = Arc::new(Mutex::new(serde_json::Map::new()));
        let op_deadline = self.inner.clock.now() + self.inner.config.operation_timeout;

        for (index, step) in def.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                self.finish_cancelled(run_id, trace_id);
                return;
            }

            let spec = step.spec().clone();

            if step.skippable_when(&params) {
                let applied =
                    self.with_run_mut(run_id, |run| {
                        run.step_skipped(index, self.inner.clock.epoch_ms())
                    });
                if !matches!(applied, Some(Ok(()))) {
                    self.fail_run(run_id, StepError::internal("step bookkeeping failed"), trace_id);
                    return;
                }
                self.emit(
                    Event::Log {
                        run_id: Some(*run_id),
                        step_id: Some(spec.id.clone()),
                        level: LogLevel::Info,
                        message: "step skipped".to_string(),
                        fields: serde_json::Map::new(),
                    },
                    trace_id,
                );
                continue;
            }

            // Attempt loop: re-invocation with the same inputs, only the
            // attempt counter and deadline differ.
            loop {
                let epoch = self.inner.clock.epoch_ms();
                let started = self.with_run_mut(run_id, |run| {
                    run.step_started(index, epoch).map(|_| run.step_attempts(index))
                });
                let attempt = match started {
                    Some(Ok(attempt)) => attempt,
                    _ => {
                        self.fail_run(
                            run_id,
                            StepError::internal("step bookkeeping failed"),
                            trace_id,
                        );
                        return;
                    }
                };
                self.emit(
                    Event::StepStarted { run_id: *run_id, step_id: spec.id.clone(), attempt },
                    trace_id,
                );

                let reporter = Reporter::new(
                    *run_id,
                    spec.id.clone(),
                    trace_id,
                    self.inner.bus.clone(),
                    Arc::clone(&self.inner.clock),
                    self.progress_hook(*run_id, index),
                );
                let ctx = OperationContext::new(
                    *run_id,
                    trace_id,
                    Arc::clone(&params),
                    Arc::clone(&shared),
                    cancel.clone(),
                    reporter,
                    attempt,
                );

                let remaining = op_deadline.saturating_duration_since(self.inner.clock.now());
                let budget = spec.timeout.min(remaining);

                let result = self.run_step(Arc::clone(step), ctx, &cancel, budget, &spec.id).await;

                match result {
                    Ok(()) => {
                        let epoch = self.inner.clock.epoch_ms();
                        self.with_run_mut(run_id, |run| run.step_completed(index, epoch));
                        self.emit(
                            Event::StepCompleted { run_id: *run_id, step_id: spec.id.clone() },
                            trace_id,
                        );
                        break;
                    }
                    Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                        self.finish_cancelled(run_id, trace_id);
                        return;
                    }
                    Err(err) => {
                        if spec.retry.should_retry(attempt) {
                            let backoff = spec.retry.backoff(attempt);
                            debug!(
                                run_id = %run_id,
                                step = %spec.id,
                                attempt,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %err,
                                "step failed, retrying"
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    self.finish_cancelled(run_id, trace_id);
                                    return;
                                }
                                _ = tokio::time::sleep(backoff) => {}
                            }
                            continue;
                        }

                        let epoch = self.inner.clock.epoch_ms();
                        self.with_run_mut(run_id, |run| {
                            let _ = run.step_failed(index, err.clone(), epoch);
                            run.cancel_remaining_steps(epoch);
                            let _ = run.transition(RunState::Failed, epoch);
                        });
                        self.emit(
                            Event::StepFailed {
                                run_id: *run_id,
                                step_id: spec.id.clone(),
                                error: err.clone(),
                                attempts: attempt,
                            },
                            trace_id,
                        );
                        self.emit(Event::OperationFailed { run_id: *run_id, error: err }, trace_id);
                        self.emit_snapshot(run_id, trace_id);
                        return;
                    }
                }
            }
        }

        let epoch = self.inner.clock.epoch_ms();
        self.with_run_mut(run_id, |run| {
            let _ = run.transition(RunState::Completed, epoch);
        });
        self.emit(Event::OperationCompleted { run_id: *run_id }, trace_id);
        self.emit_snapshot(run_id, trace_id);
    }

    /// Execute one step attempt inside a spawned task so panics are
    /// contained, bounded by the step budget and the run's cancel token.
    async fn run_step(
        &self,
        step: Arc<dyn crate::step::Step>,
        ctx: OperationContext,
        cancel: &CancellationToken,
        budget: Duration,
        step_id: &str,
    ) -> Result<(), StepError> {
        let mut task = tokio::spawn(async move { step.execute(&ctx).await });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => {
                    Err(StepError::internal(format!("step '{step_id}' panicked")))
                }
                Err(_) => Err(StepError::internal(format!("step '{step_id}' was aborted"))),
            },
            _ = tokio::time::sleep(budget) => {
                task.abort();
                Err(StepError::timeout(format!(
                    "step '{step_id}' exceeded {}ms",
                    budget.as_millis()
                )))
            }
            _ = cancel.cancelled() => {
                task.abort();
                Err(StepError::cancelled())
            }
        }
    }

    fn finish_cancelled(&self, run_id: &RunId, trace_id: TraceId) {
        let epoch = self.inner.clock.epoch_ms();
        self.with_run_mut(run_id.as_str(), |run| {
            run.cancel_remaining_steps(epoch);
            let _ = run.transition(RunState::Cancelled, epoch);
        });
        self.emit(Event::OperationCancelled { run_id: *run_id }, trace_id);
        self.emit_snapshot(run_id, trace_id);
    }

    fn fail_run(&self, run_id: &RunId, error: StepError, trace_id: TraceId) {
        let epoch = self.inner.clock.epoch_ms();
        self.with_run_mut(run_id.as_str(), |run| {
            run.cancel_remaining_steps(epoch);
            run.error = Some(error.clone());
            if run.state == RunState::Pending {
                let _ = run.transition(RunState::Running, epoch);
            }
            let _ = run.transition(RunState::Failed, epoch);
        });
        self.emit(Event::OperationFailed { run_id: *run_id, error }, trace_id);
        self.emit_snapshot(run_id, trace_id);
    }

    fn with_run_mut<T>(&self, run_id: &str, f: impl FnOnce(&mut Run) -> T) -> Option<T> {
        let mut runs = self.inner.runs.write();
        runs.get_mut(run_id).map(|entry| f(&mut entry.run))
    }

    /// Progress updates reach the run by id through a weak handle; the
    /// reporter never holds the run itself.
    fn progress_hook(&self, run_id: RunId, index: usize) -> ProgressHook {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |percent| {
            if let Some(inner) = weak.upgrade() {
                let mut runs = inner.runs.write();
                if let Some(entry) = runs.get_mut(run_id.as_str()) {
                    if let Ok(effective) = entry.run.step_progress(index, percent) {
                        return effective;
                    }
                }
            }
            percent.clamp(0.0, 100.0)
        })
    }

    fn emit_snapshot(&self, run_id: &RunId, trace_id: TraceId) {
        if let Some(run) = self.snapshot(run_id.as_str()) {
            self.emit(Event::OperationSnapshot { run_id: *run_id, run }, trace_id);
        }
    }

    fn emit(&self, event: Event, trace_id: TraceId) {
        self.inner
            .bus
            .publish(Envelope::new(event, self.inner.clock.epoch_ms(), Some(trace_id)));
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
