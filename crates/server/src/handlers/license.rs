// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! License endpoints. Part of the gate's bypass set so an unlicensed
//! machine can still activate itself.

use crate::problem::Problem;
use crate::state::SharedState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use chrono::DateTime;
use pulse_core::{ErrorKind, TraceId};
use pulse_license::LicenseStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    license_status: LicenseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    days_left: Option<i64>,
    message: String,
    trace_id: TraceId,
}

/// `GET /api/license/status`
pub async fn status(
    State(state): State<SharedState>,
    Extension(trace_id): Extension<TraceId>,
) -> Json<StatusResponse> {
    let info = state.validator.status(&state.config.machine_id).await;
    Json(StatusResponse {
        license_status: info.status,
        days_left: info.days_left,
        message: info.message,
        trace_id,
    })
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub license_key: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActivateResponse {
    success: bool,
    activated_at: String,
    license_status: LicenseStatus,
}

/// `POST /api/license/activate`
pub async fn activate(
    State(state): State<SharedState>,
    Extension(trace_id): Extension<TraceId>,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return Problem::new(ErrorKind::Validation, rejection.body_text(), Some(trace_id))
                .into_response()
        }
    };

    match state
        .validator
        .activate(&state.config.machine_id, &req.license_key, req.email.as_deref())
        .await
    {
        Ok(info) => {
            let activated_at = DateTime::from_timestamp_millis(state.clock.epoch_ms() as i64)
                .unwrap_or_default()
                .to_rfc3339();
            Json(ActivateResponse {
                success: true,
                activated_at,
                license_status: info.status,
            })
            .into_response()
        }
        Err(err) => Problem::from_provider(&err, Some(trace_id)).into_response(),
    }
}
