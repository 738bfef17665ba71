// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route composition.

use crate::gate::{self, RouteClass};
use crate::handlers::{license, meta, operations};
use crate::hub::ws_handler;
use crate::problem::Problem;
use crate::state::SharedState;
use crate::trace;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use pulse_core::{ErrorKind, TraceId};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/health", get(meta::health))
        .route("/health/live", get(meta::health_live))
        .route("/health/ready", get(meta::health_ready))
        .route("/version", get(meta::version))
        .route("/metrics", get(meta::metrics))
        .route("/license", get(meta::license_page))
        .route("/api/operations", post(operations::start).get(operations::list))
        .route(
            "/api/operations/{id}",
            get(operations::get).delete(operations::prune),
        )
        .route("/api/operations/{id}/cancel", post(operations::cancel))
        .route("/api/license/status", get(license::status))
        .route("/api/license/activate", post(license::activate))
        .route("/ws", get(ws_handler))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), gate::license_gate))
        .layer(middleware::from_fn(trace::assign_trace_id))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unmatched paths: problem-details under `/api`, plain 404 elsewhere.
async fn fallback(Extension(trace_id): Extension<TraceId>, req: Request) -> Response {
    let uri: &Uri = req.uri();
    if gate::classify(uri.path()) == RouteClass::Api {
        Problem::new(
            ErrorKind::NotFound,
            format!("no route for {}", uri.path()),
            Some(trace_id),
        )
        .into_response()
    } else {
        (StatusCode::NOT_FOUND, "not found").into_response()
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new();
    }
    let origins: Vec<HeaderValue> =
        allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
