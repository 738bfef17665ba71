// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation endpoints: start, list, snapshot, cancel, prune.

use crate::problem::Problem;
use crate::state::SharedState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use pulse_core::{ErrorKind, Run, RunId, RunState, TraceId};
use pulse_engine::QueueError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub definition_id: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    run_id: RunId,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    items: Vec<Run>,
    total: usize,
    page: usize,
    page_size: usize,
}

/// `POST /api/operations`: create a run and queue it. Returns 202
/// immediately; completion is observed over the realtime channel or by
/// polling the snapshot.
pub async fn start(
    State(state): State<SharedState>,
    Extension(trace_id): Extension<TraceId>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return Problem::new(ErrorKind::Validation, rejection.body_text(), Some(trace_id))
                .into_response()
        }
    };

    let run_id = match state.manager.start(&req.definition_id, req.params, trace_id) {
        Ok(run_id) => run_id,
        Err(err) => return Problem::from_manager(&err, Some(trace_id)).into_response(),
    };

    match state.queue.submit(run_id).await {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(StartResponse { run_id, status: "queued" }),
        )
            .into_response(),
        Err(err) => {
            // The run was created but never admitted; settle it.
            let _ = state.manager.cancel(&run_id);
            Problem::from_queue(&err, Some(trace_id)).into_response()
        }
    }
}

/// `GET /api/operations`: page through runs, newest first.
pub async fn list(
    State(state): State<SharedState>,
    Extension(trace_id): Extension<TraceId>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match parse_state(raw) {
            Some(state) => Some(state),
            None => {
                return Problem::new(
                    ErrorKind::Validation,
                    format!("unknown status '{raw}'"),
                    Some(trace_id),
                )
                .into_response()
            }
        },
    };

    let mut runs = state.manager.list();
    if let Some(status) = status {
        runs.retain(|r| r.state == status);
    }

    let total = runs.len();
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(50).clamp(1, 500);
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);

    Json(ListResponse { items: runs[start..end].to_vec(), total, page, page_size })
        .into_response()
}

/// `GET /api/operations/{id}`: deep-copy snapshot.
pub async fn get(
    State(state): State<SharedState>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.snapshot(&id) {
        Some(run) => Json(run).into_response(),
        None => {
            Problem::new(ErrorKind::NotFound, format!("run '{id}' not found"), Some(trace_id))
                .into_response()
        }
    }
}

/// `POST /api/operations/{id}/cancel`: request cancellation.
pub async fn cancel(
    State(state): State<SharedState>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<String>,
) -> Response {
    let outcome = match state.queue.cancel(&id) {
        Ok(()) => Ok(()),
        // Runs can exist without a queue record if admission failed.
        Err(QueueError::NotFound(_)) => {
            state.manager.cancel(&id).map_err(|err| Problem::from_manager(&err, Some(trace_id)))
        }
        Err(err) => Err(Problem::from_queue(&err, Some(trace_id))),
    };

    match outcome {
        Err(problem) => problem.into_response(),
        Ok(()) => {
            let status = state
                .manager
                .snapshot(&id)
                .map(|run| run.state)
                .unwrap_or(RunState::Cancelled);
            Json(serde_json::json!({"status": status})).into_response()
        }
    }
}

/// `DELETE /api/operations/{id}`: prune a terminal run and its job
/// record.
pub async fn prune(
    State(state): State<SharedState>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.prune(&id) {
        Ok(()) => {
            state.queue.remove_record(&id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => Problem::from_manager(&err, Some(trace_id)).into_response(),
    }
}

fn parse_state(raw: &str) -> Option<RunState> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}
