// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_job_is_queued() {
    let job = Job::new(RunId::from_string("run-1"), 100);
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.created_at_ms, 100);
    assert_eq!(job.attempt, 0);
    assert!(job.started_at_ms.is_none());
}

#[test]
fn claim_then_finish_stamps_times() {
    let mut job = Job::new(RunId::from_string("run-1"), 100);
    job.mark_running(200).unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.started_at_ms, Some(200));

    job.finish(JobStatus::Completed, 300).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.finished_at_ms, Some(300));
}

#[test]
fn queued_job_can_be_cancelled_without_claim() {
    let mut job = Job::new(RunId::from_string("run-1"), 100);
    job.finish(JobStatus::Cancelled, 150).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.started_at_ms.is_none());
}

#[yare::parameterized(
    completed = { JobStatus::Completed },
    failed    = { JobStatus::Failed },
    cancelled = { JobStatus::Cancelled },
)]
fn terminal_jobs_reject_further_transitions(terminal: JobStatus) {
    let mut job = Job::new(RunId::from_string("run-1"), 0);
    job.mark_running(1).unwrap();
    job.finish(terminal, 2).unwrap();

    assert!(job.mark_running(3).is_err());
    assert!(job.finish(JobStatus::Failed, 3).is_err());
    assert_eq!(job.status, terminal);
}

#[test]
fn queued_cannot_complete_directly() {
    let mut job = Job::new(RunId::from_string("run-1"), 0);
    let err = job.finish(JobStatus::Completed, 1).unwrap_err();
    assert_eq!(err, JobTransition { from: JobStatus::Queued, to: JobStatus::Completed });
}

#[yare::parameterized(
    completed = { RunState::Completed, JobStatus::Completed },
    failed    = { RunState::Failed, JobStatus::Failed },
    cancelled = { RunState::Cancelled, JobStatus::Cancelled },
    running   = { RunState::Running, JobStatus::Running },
)]
fn job_status_mirrors_run_state(state: RunState, expected: JobStatus) {
    assert_eq!(JobStatus::from(state), expected);
}
