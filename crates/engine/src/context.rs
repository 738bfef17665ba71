// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared execution context handed to steps.

use crate::reporter::Reporter;
use parking_lot::Mutex;
use pulse_core::{RunId, StepError, TraceId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// State visible to a step while it executes: caller params, values shared
/// across the run's steps, the run's cancel token, and a reporter bound to
/// the current step.
///
/// Cloning is cheap; retries of a step observe the same params and shared
/// values, with only the attempt counter advanced.
#[derive(Clone)]
pub struct OperationContext {
    run_id: RunId,
    trace_id: TraceId,
    params: Arc<serde_json::Value>,
    shared: Arc<Mutex<serde_json::Map<String, serde_json::Value>>>,
    cancel: CancellationToken,
    reporter: Reporter,
    attempt: u32,
}

impl OperationContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        run_id: RunId,
        trace_id: TraceId,
        params: Arc<serde_json::Value>,
        shared: Arc<Mutex<serde_json::Map<String, serde_json::Value>>>,
        cancel: CancellationToken,
        reporter: Reporter,
        attempt: u32,
    ) -> Self {
        Self { run_id, trace_id, params, shared, cancel, reporter, attempt }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Caller-supplied parameters, immutable for the lifetime of the run.
    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    /// Execution attempt for the current step, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Read a value left by an earlier step.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.shared.lock().get(key).cloned()
    }

    /// Publish a value for later steps.
    pub fn set_value(&self, key: impl Into<String>, value: serde_json::Value) {
        self.shared.lock().insert(key.into(), value);
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the run has been cancelled. Steps call this between
    /// work segments.
    pub fn checkpoint(&self) -> Result<(), StepError> {
        if self.cancel.is_cancelled() {
            return Err(StepError::cancelled());
        }
        Ok(())
    }

    /// Cancel-aware sleep: returns early with `cancelled` when the run's
    /// token fires.
    pub async fn sleep(&self, duration: Duration) -> Result<(), StepError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(StepError::cancelled()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
