// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::error::{ErrorKind, StepError};
use crate::event::Event;
use crate::run::{Run, RunId};

/// Proptest strategies for core state machine and event types.
pub mod strategies {
    use super::*;
    use crate::event::LogLevel;
    use crate::run::{RunState, StepState};
    use proptest::prelude::*;

    pub fn arb_run_state() -> impl Strategy<Value = RunState> {
        prop_oneof![
            Just(RunState::Pending),
            Just(RunState::Running),
            Just(RunState::Paused),
            Just(RunState::Completed),
            Just(RunState::Failed),
            Just(RunState::Cancelled),
        ]
    }

    pub fn arb_step_state() -> impl Strategy<Value = StepState> {
        prop_oneof![
            Just(StepState::Pending),
            Just(StepState::Active),
            Just(StepState::Completed),
            Just(StepState::Failed),
            Just(StepState::Skipped),
            Just(StepState::Cancelled),
        ]
    }

    pub fn arb_transition_sequence(max: usize) -> impl Strategy<Value = Vec<RunState>> {
        proptest::collection::vec(arb_run_state(), 1..max)
    }

    fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
        prop_oneof![
            Just(ErrorKind::Validation),
            Just(ErrorKind::Timeout),
            Just(ErrorKind::Cancelled),
            Just(ErrorKind::Unavailable),
            Just(ErrorKind::Internal),
        ]
    }

    fn arb_log_level() -> impl Strategy<Value = LogLevel> {
        prop_oneof![
            Just(LogLevel::Debug),
            Just(LogLevel::Info),
            Just(LogLevel::Warn),
            Just(LogLevel::Error),
        ]
    }

    pub fn arb_event() -> impl Strategy<Value = Event> {
        let step_id = "[a-z]{1,12}";
        prop_oneof![
            Just(Event::Ping),
            Just(Event::Pong),
            "[a-z0-9-]{1,16}".prop_map(|id| Event::OperationStarted {
                run_id: RunId::from_string(&id),
                definition_id: "report".to_string(),
            }),
            ("[a-z0-9-]{1,16}", step_id, 0.0f64..=100.0).prop_map(|(id, step, percent)| {
                Event::OperationProgress {
                    run_id: RunId::from_string(&id),
                    step_id: step,
                    percent,
                    message: None,
                }
            }),
            ("[a-z0-9-]{1,16}", step_id, 1u32..5).prop_map(|(id, step, attempt)| {
                Event::StepStarted { run_id: RunId::from_string(&id), step_id: step, attempt }
            }),
            ("[a-z0-9-]{1,16}", step_id, arb_error_kind(), ".{0,40}").prop_map(
                |(id, step, kind, detail)| Event::StepFailed {
                    run_id: RunId::from_string(&id),
                    step_id: step,
                    error: StepError::new(kind, detail),
                    attempts: 1,
                }
            ),
            (arb_log_level(), ".{0,40}").prop_map(|(level, message)| Event::Log {
                run_id: None,
                step_id: None,
                level,
                message,
                fields: serde_json::Map::new(),
            }),
            "[a-z0-9-]{1,16}".prop_map(|id| Event::OperationSnapshot {
                run_id: RunId::from_string(&id),
                run: sample_run(&id),
            }),
        ]
    }
}

/// A small deterministic run for event payload tests.
pub fn sample_run(id: &str) -> Run {
    Run::new(
        RunId::from_string(id),
        "report",
        [
            ("scrape".to_string(), "Scrape".to_string()),
            ("parse".to_string(), "Parse".to_string()),
        ],
        serde_json::json!({}),
        1_000_000,
    )
}
