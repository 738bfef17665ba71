// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request trace ids.
//!
//! Every request gets a fresh `TraceId` in its extensions; handlers carry
//! it into problem bodies and events, and the response echoes it in an
//! `x-trace-id` header.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use pulse_core::TraceId;

pub const TRACE_HEADER: &str = "x-trace-id";

pub async fn assign_trace_id(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::new();
    req.extensions_mut().insert(trace_id);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}
