// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-crate test fixtures.

use crate::bus::EventBus;
use crate::context::OperationContext;
use crate::reporter::Reporter;
use pulse_core::{Envelope, Event, RunId, SharedClock, SystemClock, TraceId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub(crate) fn test_clock() -> SharedClock {
    Arc::new(SystemClock)
}

pub(crate) fn test_reporter(bus: &EventBus, run_id: RunId, step_id: &str) -> Reporter {
    Reporter::new(
        run_id,
        step_id,
        TraceId::new(),
        bus.clone(),
        test_clock(),
        Arc::new(|p: f64| p.clamp(0.0, 100.0)),
    )
}

pub(crate) fn test_context(
    bus: &EventBus,
    cancel: CancellationToken,
    params: serde_json::Value,
) -> OperationContext {
    let run_id = RunId::new();
    OperationContext::new(
        run_id,
        TraceId::new(),
        Arc::new(params),
        Arc::new(parking_lot::Mutex::new(serde_json::Map::new())),
        cancel,
        test_reporter(bus, run_id, "step"),
        1,
    )
}

/// Drain everything currently buffered on a subscription.
pub(crate) fn drain(rx: &mut broadcast::Receiver<Envelope>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    events
}

pub(crate) fn kinds(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind()).collect()
}
