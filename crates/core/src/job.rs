// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue-side job record, paired 1:1 with a run.

use crate::run::{RunId, RunState};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Queued => matches!(next, JobStatus::Running | JobStatus::Cancelled),
            JobStatus::Running => {
                matches!(next, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }
}

impl From<RunState> for JobStatus {
    /// Terminal mapping from the run that backs this job. Non-terminal run
    /// states map to `Running`: the job stays claimed until the run ends.
    fn from(state: RunState) -> Self {
        match state {
            RunState::Completed => JobStatus::Completed,
            RunState::Failed => JobStatus::Failed,
            RunState::Cancelled => JobStatus::Cancelled,
            RunState::Pending | RunState::Running | RunState::Paused => JobStatus::Running,
        }
    }
}

/// Illegal job status transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition: {from} -> {to}")]
pub struct JobTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// The queue's record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: RunId,
    pub status: JobStatus,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Top-level retries are not performed; counter reserved.
    pub attempt: u32,
}

impl Job {
    pub fn new(id: RunId, created_at_ms: u64) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            created_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            attempt: 0,
        }
    }

    fn transition(&mut self, to: JobStatus, epoch_ms: u64) -> Result<(), JobTransition> {
        if !self.status.can_transition_to(to) {
            return Err(JobTransition { from: self.status, to });
        }
        if to == JobStatus::Running {
            self.started_at_ms = Some(epoch_ms);
        }
        if to.is_terminal() {
            self.finished_at_ms = Some(epoch_ms);
        }
        self.status = to;
        Ok(())
    }

    /// Claim the job for a worker.
    pub fn mark_running(&mut self, epoch_ms: u64) -> Result<(), JobTransition> {
        self.transition(JobStatus::Running, epoch_ms)
    }

    /// Record the terminal status once the backing run has ended.
    pub fn finish(&mut self, status: JobStatus, epoch_ms: u64) -> Result<(), JobTransition> {
        debug_assert!(status.is_terminal(), "finish called with non-terminal status");
        self.transition(status, epoch_ms)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
