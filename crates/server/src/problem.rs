// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Problem-details error bodies.
//!
//! Every 4xx/5xx JSON response has the same shape:
//! `{type, title, status, detail, trace_id}` with a stable `type` URI per
//! error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use pulse_core::{ErrorKind, TraceId};
use pulse_engine::{ManagerError, QueueError};
use pulse_license::ProviderError;
use serde::Serialize;

/// A problem-details payload, convertible into a response.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_uri: &'static str,
    pub title: &'static str,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
}

impl Problem {
    pub fn new(kind: ErrorKind, detail: impl Into<String>, trace_id: Option<TraceId>) -> Self {
        Self {
            type_uri: kind.type_uri(),
            title: title_for(kind),
            status: kind.http_status(),
            detail: detail.into(),
            trace_id,
        }
    }

    pub fn from_manager(err: &ManagerError, trace_id: Option<TraceId>) -> Self {
        Self::new(err.kind(), err.to_string(), trace_id)
    }

    pub fn from_queue(err: &QueueError, trace_id: Option<TraceId>) -> Self {
        Self::new(err.kind(), err.to_string(), trace_id)
    }

    pub fn from_provider(err: &ProviderError, trace_id: Option<TraceId>) -> Self {
        Self::new(err.kind(), err.to_string(), trace_id)
    }
}

fn title_for(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "Invalid request",
        ErrorKind::NotFound => "Not found",
        ErrorKind::Conflict => "Conflict",
        ErrorKind::Precondition => "Precondition required",
        ErrorKind::Timeout => "Deadline exceeded",
        ErrorKind::Cancelled => "Cancelled",
        ErrorKind::Unavailable => "Temporarily unavailable",
        ErrorKind::Internal => "Internal error",
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
#[path = "problem_tests.rs"]
mod tests;
