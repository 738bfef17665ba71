// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! License gate middleware.
//!
//! Classifies each request, then admits, denies with a problem body, or
//! redirects to the activation page. Classification is ordered: bypass
//! rules win over the API prefix, which wins over the HTML fallback.

use crate::problem::Problem;
use crate::state::SharedState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use pulse_core::{ErrorKind, TraceId};
use pulse_license::Decision;
use tracing::debug;

/// How a path is treated by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Admitted without a license check.
    Bypass,
    /// Denied with `412` problem-details.
    Api,
    /// Denied with a `307` redirect to the activation page.
    Html,
}

/// First match wins; evaluated in declaration order.
pub fn classify(path: &str) -> RouteClass {
    const BYPASS_EXACT: &[&str] = &["/version", "/metrics", "/ws", "/favicon.ico", "/license"];
    const BYPASS_PREFIX: &[&str] = &["/health", "/api/license", "/assets"];

    if BYPASS_EXACT.contains(&path) {
        return RouteClass::Bypass;
    }
    if BYPASS_PREFIX.iter().any(|p| path == *p || path.starts_with(&format!("{p}/"))) {
        return RouteClass::Bypass;
    }
    if path == "/api" || path.starts_with("/api/") {
        return RouteClass::Api;
    }
    RouteClass::Html
}

pub async fn license_gate(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let class = classify(req.uri().path());
    if class == RouteClass::Bypass {
        return next.run(req).await;
    }

    match state.validator.decide(&state.config.machine_id).await {
        Decision::Admit => next.run(req).await,
        Decision::Deny(reason) => {
            let path = req.uri().path().to_string();
            debug!(%path, reason = reason.code(), "request denied by license gate");
            match class {
                RouteClass::Api => {
                    let trace_id = req.extensions().get::<TraceId>().copied();
                    Problem::new(
                        ErrorKind::Precondition,
                        format!("license check failed: {}", reason.code()),
                        trace_id,
                    )
                    .into_response()
                }
                RouteClass::Html | RouteClass::Bypass => Redirect::temporary(&format!(
                    "/license?reason={}&return={}",
                    reason.code(),
                    path
                ))
                .into_response(),
            }
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
