// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime event envelope and the closed event set.
//!
//! Serializes with `{"type": "event:name", "data": {...}}` plus envelope
//! metadata. The set is closed: clients can rely on exhaustive matching.

use crate::error::StepError;
use crate::run::{Run, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier assigned to a realtime client connection.
    pub struct ClientId("cli-");
}

crate::define_id! {
    /// Correlation id stamped on requests, events, and problem bodies.
    pub struct TraceId("trc-");
}

/// Severity of a broadcast log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// Payload of a realtime message. Closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// First message on every connection, exactly once.
    #[serde(rename = "connection")]
    Connection { status: String, client_id: ClientId },

    #[serde(rename = "operation:started")]
    OperationStarted { run_id: RunId, definition_id: String },

    #[serde(rename = "operation:progress")]
    OperationProgress {
        run_id: RunId,
        step_id: String,
        percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Full run snapshot; always the last event of a run.
    #[serde(rename = "operation:snapshot")]
    OperationSnapshot { run_id: RunId, run: Run },

    #[serde(rename = "operation:completed")]
    OperationCompleted { run_id: RunId },

    #[serde(rename = "operation:failed")]
    OperationFailed { run_id: RunId, error: StepError },

    #[serde(rename = "operation:cancelled")]
    OperationCancelled { run_id: RunId },

    #[serde(rename = "step:started")]
    StepStarted { run_id: RunId, step_id: String, attempt: u32 },

    #[serde(rename = "step:completed")]
    StepCompleted { run_id: RunId, step_id: String },

    #[serde(rename = "step:failed")]
    StepFailed { run_id: RunId, step_id: String, error: StepError, attempts: u32 },

    #[serde(rename = "log")]
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        level: LogLevel,
        message: String,
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        fields: serde_json::Map<String, serde_json::Value>,
    },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pong")]
    Pong,
}

impl Event {
    /// The wire tag, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connection { .. } => "connection",
            Event::OperationStarted { .. } => "operation:started",
            Event::OperationProgress { .. } => "operation:progress",
            Event::OperationSnapshot { .. } => "operation:snapshot",
            Event::OperationCompleted { .. } => "operation:completed",
            Event::OperationFailed { .. } => "operation:failed",
            Event::OperationCancelled { .. } => "operation:cancelled",
            Event::StepStarted { .. } => "step:started",
            Event::StepCompleted { .. } => "step:completed",
            Event::StepFailed { .. } => "step:failed",
            Event::Log { .. } => "log",
            Event::Error { .. } => "error",
            Event::Ping => "ping",
            Event::Pong => "pong",
        }
    }

    /// Run this event belongs to, if any.
    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Event::OperationStarted { run_id, .. }
            | Event::OperationProgress { run_id, .. }
            | Event::OperationSnapshot { run_id, .. }
            | Event::OperationCompleted { run_id }
            | Event::OperationFailed { run_id, .. }
            | Event::OperationCancelled { run_id }
            | Event::StepStarted { run_id, .. }
            | Event::StepCompleted { run_id, .. }
            | Event::StepFailed { run_id, .. } => Some(run_id),
            Event::Log { run_id, .. } => run_id.as_ref(),
            Event::Connection { .. } | Event::Error { .. } | Event::Ping | Event::Pong => None,
        }
    }
}

/// Wire envelope: event payload plus timestamp and correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: Event,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
}

impl Envelope {
    /// Stamp an event with an epoch-milliseconds timestamp.
    pub fn new(event: Event, epoch_ms: u64, trace_id: Option<TraceId>) -> Self {
        let timestamp =
            DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).unwrap_or_default();
        Self { event, timestamp, trace_id }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
