// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bus::EventBus;
use crate::definition::{OperationDefinition, StepRef};
use crate::step::FnStep;
use crate::test_support::{drain, kinds, test_clock};
use pulse_core::{ErrorKind, RetryPolicy, RunState, StepState};
use std::sync::atomic::{AtomicU32, Ordering};

fn test_manager() -> Manager {
    Manager::new(EventBus::new(512), test_clock(), ManagerConfig::default())
}

fn noop(id: &str) -> FnStep {
    FnStep::new(StepRef::new(id, id), |_ctx| async { Ok(()) })
}

fn pipeline(manager: &Manager, id: &str) {
    manager
        .register(
            OperationDefinition::builder(id, "Test pipeline")
                .step(noop("scrape"))
                .step(noop("parse"))
                .step(noop("index"))
                .build()
                .unwrap(),
        )
        .unwrap();
}

fn start(manager: &Manager, def: &str) -> pulse_core::RunId {
    manager.start(def, serde_json::json!({}), pulse_core::TraceId::new()).unwrap()
}

#[test]
fn register_rejects_duplicate_ids() {
    let manager = test_manager();
    pipeline(&manager, "report");
    let def =
        OperationDefinition::builder("report", "Again").step(noop("scrape")).build().unwrap();
    let err = manager.register(def).unwrap_err();
    assert_eq!(err, ManagerError::AlreadyRegistered("report".to_string()));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn start_requires_known_definition() {
    let manager = test_manager();
    let err =
        manager.start("nope", serde_json::json!({}), pulse_core::TraceId::new()).unwrap_err();
    assert_eq!(err, ManagerError::UnknownOperation("nope".to_string()));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn start_rejects_non_object_params() {
    let manager = test_manager();
    pipeline(&manager, "report");
    let err =
        manager.start("report", serde_json::json!([1, 2]), pulse_core::TraceId::new()).unwrap_err();
    assert!(matches!(err, ManagerError::InvalidParams(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn start_accepts_null_params_as_empty_object() {
    let manager = test_manager();
    pipeline(&manager, "report");
    let run_id = manager
        .start("report", serde_json::Value::Null, pulse_core::TraceId::new())
        .unwrap();
    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.params, serde_json::json!({}));
    assert_eq!(run.state, RunState::Pending);
}

#[tokio::test]
async fn execute_runs_steps_in_order_and_emits_events() {
    let manager = test_manager();
    pipeline(&manager, "report");
    let mut rx = manager.bus().subscribe();

    let run_id = start(&manager, "report");
    manager.execute(&run_id).await;

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec![
            "operation:started",
            "step:started",
            "step:completed",
            "step:started",
            "step:completed",
            "step:started",
            "step:completed",
            "operation:completed",
            "operation:snapshot",
        ]
    );

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Completed);
    assert!(run.all_steps_satisfied());
    assert!(run.started_at_ms.is_some());
    assert!(run.finished_at_ms.is_some());
}

#[tokio::test]
async fn terminal_snapshot_is_the_last_event() {
    let manager = test_manager();
    pipeline(&manager, "report");
    let mut rx = manager.bus().subscribe();

    let run_id = start(&manager, "report");
    manager.execute(&run_id).await;

    let events = drain(&mut rx);
    match events.last() {
        Some(pulse_core::Event::OperationSnapshot { run, .. }) => {
            assert_eq!(run.state, RunState::Completed);
        }
        other => panic!("expected snapshot last, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_step_is_retried_then_fails_the_run() {
    let manager = test_manager();
    let attempts = std::sync::Arc::new(AtomicU32::new(0));
    let seen = std::sync::Arc::clone(&attempts);

    let retry = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(10));
    manager
        .register(
            OperationDefinition::builder("flaky", "Flaky")
                .step(noop("scrape"))
                .step(FnStep::new(
                    StepRef::new("parse", "Parse").retry(retry),
                    move |_ctx| {
                        let seen = std::sync::Arc::clone(&seen);
                        async move {
                            seen.fetch_add(1, Ordering::SeqCst);
                            Err(pulse_core::StepError::unavailable("parser crashed"))
                        }
                    },
                ))
                .step(noop("index"))
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut rx = manager.bus().subscribe();
    let run_id = start(&manager, "flaky");
    manager.execute(&run_id).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec![
            "operation:started",
            "step:started",
            "step:completed",
            "step:started",
            "step:started",
            "step:failed",
            "operation:failed",
            "operation:snapshot",
        ]
    );

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.step_states[1].state, StepState::Failed);
    assert_eq!(run.step_states[1].attempts, 2);
    // Steps after the failure never started
    assert_eq!(run.step_states[2].state, StepState::Cancelled);
    assert_eq!(run.error.as_ref().unwrap().kind, ErrorKind::Unavailable);
}

#[tokio::test]
async fn retry_success_on_second_attempt_completes_the_run() {
    let manager = test_manager();
    let retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
    manager
        .register(
            OperationDefinition::builder("heal", "Heals")
                .step(FnStep::new(StepRef::new("fetch", "Fetch").retry(retry), |ctx| async move {
                    if ctx.attempt() < 2 {
                        Err(pulse_core::StepError::unavailable("cold start"))
                    } else {
                        Ok(())
                    }
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

    let run_id = start(&manager, "heal");
    manager.execute(&run_id).await;

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.step_states[0].attempts, 2);
}

#[tokio::test]
async fn step_timeout_fails_with_timeout_kind() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("slow", "Slow")
                .step(FnStep::new(
                    StepRef::new("stall", "Stall").timeout(Duration::from_millis(30)),
                    |ctx| async move { ctx.sleep(Duration::from_secs(10)).await },
                ))
                .build()
                .unwrap(),
        )
        .unwrap();

    let run_id = start(&manager, "slow");
    manager.execute(&run_id).await;

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.error.as_ref().unwrap().kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn panicking_step_surfaces_internal_error() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("boom", "Boom")
                .step(FnStep::new(StepRef::new("explode", "Explode"), |_ctx| async {
                    panic!("scraper bug")
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

    let run_id = start(&manager, "boom");
    manager.execute(&run_id).await;

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.error.as_ref().unwrap().kind, ErrorKind::Internal);
}

#[tokio::test]
async fn cancel_during_step_settles_quickly() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("nap", "Nap")
                .step(noop("scrape"))
                .step(FnStep::new(StepRef::new("sleepy", "Sleepy"), |ctx| async move {
                    ctx.sleep(Duration::from_secs(5)).await
                }))
                .step(noop("index"))
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut rx = manager.bus().subscribe();
    let run_id = start(&manager, "nap");

    let exec = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.execute(&run_id).await })
    };

    // Let the run reach the sleepy step
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled_at = std::time::Instant::now();
    manager.cancel(&run_id).unwrap();
    exec.await.unwrap();
    assert!(cancelled_at.elapsed() < Duration::from_millis(500));

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Cancelled);
    assert_eq!(run.step_states[0].state, StepState::Completed);
    assert_eq!(run.step_states[1].state, StepState::Cancelled);
    assert_eq!(run.step_states[2].state, StepState::Cancelled);

    let events = drain(&mut rx);
    let tail: Vec<_> = kinds(&events).into_iter().rev().take(2).collect();
    assert_eq!(tail, vec!["operation:snapshot", "operation:cancelled"]);
}

#[tokio::test]
async fn cancel_pending_run_finalizes_immediately() {
    let manager = test_manager();
    pipeline(&manager, "report");
    let mut rx = manager.bus().subscribe();

    let run_id = start(&manager, "report");
    manager.cancel(&run_id).unwrap();

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Cancelled);
    assert!(run.step_states.iter().all(|s| s.state == StepState::Cancelled));

    let events = drain(&mut rx);
    assert_eq!(kinds(&events), vec!["operation:cancelled", "operation:snapshot"]);

    // Executing a cancelled run is a no-op
    manager.execute(&run_id).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn cancel_is_idempotent_while_live_and_conflicts_after() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("nap", "Nap")
                .step(FnStep::new(StepRef::new("sleepy", "Sleepy"), |ctx| async move {
                    ctx.sleep(Duration::from_secs(5)).await
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

    let run_id = start(&manager, "nap");
    let exec = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.execute(&run_id).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    manager.cancel(&run_id).unwrap();
    // Second cancel before the run settles is still accepted
    let second = manager.cancel(&run_id);
    assert!(second.is_ok() || second == Err(ManagerError::AlreadyTerminal(run_id.to_string())));

    exec.await.unwrap();
    assert_eq!(
        manager.cancel(&run_id).unwrap_err(),
        ManagerError::AlreadyTerminal(run_id.to_string())
    );
}

#[test]
fn cancel_unknown_run_is_not_found() {
    let manager = test_manager();
    assert_eq!(
        manager.cancel("run-ghost").unwrap_err(),
        ManagerError::RunNotFound("run-ghost".to_string())
    );
}

#[tokio::test]
async fn skip_guard_marks_step_skipped() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("report", "Report")
                .step(noop("scrape"))
                .step(
                    FnStep::new(StepRef::new("summarize", "Summarize"), |_ctx| async { Ok(()) })
                        .skip_when(|params| params["skip_summary"].as_bool().unwrap_or(false)),
                )
                .step(noop("index"))
                .build()
                .unwrap(),
        )
        .unwrap();

    let run_id = manager
        .start("report", serde_json::json!({"skip_summary": true}), pulse_core::TraceId::new())
        .unwrap();
    manager.execute(&run_id).await;

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.step_states[1].state, StepState::Skipped);
    assert_eq!(run.step_states[1].attempts, 0);
    assert_eq!(run.step_states[2].state, StepState::Completed);
}

#[tokio::test]
async fn shared_values_flow_between_steps() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("handoff", "Handoff")
                .step(FnStep::new(StepRef::new("produce", "Produce"), |ctx| async move {
                    ctx.set_value("rows", serde_json::json!(128));
                    Ok(())
                }))
                .step(FnStep::new(StepRef::new("consume", "Consume"), |ctx| async move {
                    match ctx.get_value("rows") {
                        Some(v) if v == serde_json::json!(128) => Ok(()),
                        other => Err(pulse_core::StepError::internal(format!(
                            "expected rows, got {other:?}"
                        ))),
                    }
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

    let run_id = start(&manager, "handoff");
    manager.execute(&run_id).await;
    assert_eq!(manager.snapshot(&run_id).unwrap().state, RunState::Completed);
}

#[tokio::test]
async fn progress_reports_land_in_the_snapshot() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("progress", "Progress")
                .step(FnStep::new(StepRef::new("crawl", "Crawl"), |ctx| async move {
                    ctx.reporter().progress(130.0, "overshoot is clamped");
                    Ok(())
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

    let run_id = start(&manager, "progress");
    manager.execute(&run_id).await;

    let run = manager.snapshot(&run_id).unwrap();
    assert_eq!(run.step_states[0].progress_percent, 100.0);
}

#[tokio::test]
async fn list_is_most_recent_first_and_prune_requires_terminal() {
    let manager = test_manager();
    pipeline(&manager, "report");

    let first = start(&manager, "report");
    let second = start(&manager, "report");

    let listed: Vec<_> = manager.list().into_iter().map(|r| r.id).collect();
    assert_eq!(listed, vec![second, first]);

    assert_eq!(
        manager.prune(&first).unwrap_err(),
        ManagerError::NotTerminal(first.to_string())
    );

    manager.execute(&first).await;
    manager.prune(&first).unwrap();
    assert!(manager.snapshot(&first).is_none());
    assert_eq!(manager.list().len(), 1);
}

#[tokio::test]
async fn cancel_all_settles_every_live_run() {
    let manager = test_manager();
    manager
        .register(
            OperationDefinition::builder("nap", "Nap")
                .step(FnStep::new(StepRef::new("sleepy", "Sleepy"), |ctx| async move {
                    ctx.sleep(Duration::from_secs(10)).await
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut execs = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let run_id = start(&manager, "nap");
        ids.push(run_id);
        let manager = manager.clone();
        execs.push(tokio::spawn(async move { manager.execute(&run_id).await }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let signalled = manager.cancel_all(Duration::from_secs(2)).await;
    assert_eq!(signalled, 3);

    for exec in execs {
        exec.await.unwrap();
    }
    for id in ids {
        assert_eq!(manager.snapshot(&id).unwrap().state, RunState::Cancelled);
    }
}
