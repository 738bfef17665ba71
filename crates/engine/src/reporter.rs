// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step-scoped progress reporting.
//!
//! The reporter is the only path from a step to the realtime stream. It
//! holds ids and a bus handle, never the run itself; progress flows back
//! into run state through a narrow hook installed by the manager.

use crate::bus::EventBus;
use parking_lot::Mutex;
use pulse_core::{Envelope, Event, LogLevel, RunId, SharedClock, TraceId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum spacing between broadcast progress events per step. The closing
/// update (100%) is always delivered.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Applies a raw percent to the owning run's step record and returns the
/// effective (clamped, monotonic) value.
pub(crate) type ProgressHook = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Emitter bound to one `(run, step)` pair.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<ReporterInner>,
}

struct ReporterInner {
    run_id: RunId,
    step_id: String,
    trace_id: TraceId,
    bus: EventBus,
    clock: SharedClock,
    hook: ProgressHook,
    last_broadcast: Mutex<Option<Instant>>,
}

impl Reporter {
    pub(crate) fn new(
        run_id: RunId,
        step_id: impl Into<String>,
        trace_id: TraceId,
        bus: EventBus,
        clock: SharedClock,
        hook: ProgressHook,
    ) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                run_id,
                step_id: step_id.into(),
                trace_id,
                bus,
                clock,
                hook,
                last_broadcast: Mutex::new(None),
            }),
        }
    }

    /// Report step progress. The run's step record is always updated; the
    /// broadcast is throttled to at most one event per [`PROGRESS_INTERVAL`].
    pub fn progress(&self, percent: f64, message: impl Into<String>) {
        let inner = &self.inner;
        let effective = (inner.hook)(percent);

        let now = inner.clock.now();
        {
            let mut last = inner.last_broadcast.lock();
            let due = last.is_none_or(|at| now.duration_since(at) >= PROGRESS_INTERVAL);
            if !due && effective < 100.0 {
                return;
            }
            *last = Some(now);
        }

        let message = message.into();
        self.publish(Event::OperationProgress {
            run_id: inner.run_id,
            step_id: inner.step_id.clone(),
            percent: effective,
            message: (!message.is_empty()).then_some(message),
        });
    }

    /// Broadcast a structured log line tied to this step.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: serde_json::Map<String, serde_json::Value>,
    ) {
        self.publish(Event::Log {
            run_id: Some(self.inner.run_id),
            step_id: Some(self.inner.step_id.clone()),
            level,
            message: message.into(),
            fields,
        });
    }

    /// Announce a produced artifact. Carried on the log channel so the
    /// event set stays closed.
    pub fn artifact(&self, kind: impl Into<String>, path: impl Into<String>) {
        let mut fields = serde_json::Map::new();
        fields.insert("artifact_kind".to_string(), serde_json::Value::String(kind.into()));
        fields.insert("path".to_string(), serde_json::Value::String(path.into()));
        self.log(LogLevel::Info, "artifact produced", fields);
    }

    fn publish(&self, event: Event) {
        let inner = &self.inner;
        inner.bus.publish(Envelope::new(event, inner.clock.epoch_ms(), Some(inner.trace_id)));
    }
}

#[cfg(test)]
#[path = "reporter_tests.rs"]
mod tests;
