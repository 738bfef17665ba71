// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed error taxonomy shared across the engine and the HTTP surface.

use serde::{Deserialize, Serialize};

/// Kind of failure. Closed set; every error surfaced by the system maps
/// onto exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input at a boundary
    Validation,
    NotFound,
    /// Current state precludes the action (e.g. cancel of a terminal run)
    Conflict,
    /// License or other precondition failed
    Precondition,
    /// Operation or step deadline exceeded
    Timeout,
    /// Honored cancel; terminal but not a failure
    Cancelled,
    /// Transient upstream failure with a graceful-degradation path
    Unavailable,
    /// Caught panic or unexpected condition
    Internal,
}

crate::simple_display! {
    ErrorKind {
        Validation => "validation",
        NotFound => "not_found",
        Conflict => "conflict",
        Precondition => "precondition",
        Timeout => "timeout",
        Cancelled => "cancelled",
        Unavailable => "unavailable",
        Internal => "internal",
    }
}

impl ErrorKind {
    /// HTTP status this kind maps to when surfaced at the API boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Precondition => 412,
            // Step-local kinds surface as 500 if they ever reach the API
            ErrorKind::Timeout => 500,
            ErrorKind::Cancelled => 500,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Stable problem-details `type` URI.
    pub fn type_uri(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "/errors/validation",
            ErrorKind::NotFound => "/errors/not_found",
            ErrorKind::Conflict => "/errors/conflict",
            ErrorKind::Precondition => "/errors/precondition",
            ErrorKind::Timeout => "/errors/timeout",
            ErrorKind::Cancelled => "/errors/cancelled",
            ErrorKind::Unavailable => "/errors/unavailable",
            ErrorKind::Internal => "/errors/internal",
        }
    }
}

/// Structured failure returned by a step to the engine.
///
/// Steps never panic across the boundary; anything unexpected is wrapped
/// as `Internal` by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled")
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    /// True when the failure ends the run without counting as an error
    /// (honored cancellation).
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
