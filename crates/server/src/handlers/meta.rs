// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness, readiness, version, and metrics endpoints. All bypass the
//! license gate.

use crate::problem::Problem;
use crate::state::SharedState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use pulse_core::ErrorKind;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "uptime_seconds": state.uptime_seconds(),
    }))
}

pub async fn health_live() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "alive"}))
}

pub async fn health_ready(State(state): State<SharedState>) -> Response {
    if state.is_ready() {
        Json(serde_json::json!({"status": "ready"})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "queue_accepting": state.queue.is_accepting(),
                "queue_running": state.queue.is_running(),
                "hub_alive": state.hub.is_alive(),
            })),
        )
            .into_response()
    }
}

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "pulsed",
        "version": VERSION,
    }))
}

pub async fn metrics(State(state): State<SharedState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => Problem::new(ErrorKind::Internal, err.to_string(), None).into_response(),
    }
}

/// Minimal activation page; deny redirects land here.
pub async fn license_page() -> Html<&'static str> {
    Html(
        "<html><body><h1>Pulse license required</h1>\
         <p>Activate with <code>POST /api/license/activate</code>.</p></body></html>",
    )
}
