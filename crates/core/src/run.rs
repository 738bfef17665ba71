// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run identifier and state machines.
//!
//! A [`Run`] is one execution of an operation definition: an ordered list
//! of step statuses plus a top-level state. All transitions are validated
//! here so observers can never see an illegal sequence.

use crate::error::StepError;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a run instance.
    ///
    /// Doubles as the job id on the queue side: every run has exactly one
    /// queue record under the same id.
    pub struct RunId("run-");
}

/// Top-level state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    RunState {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }

    /// Legal transition check. Terminal states accept nothing; `Paused`
    /// is the only reversible state.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match self {
            RunState::Pending => {
                matches!(next, RunState::Running | RunState::Cancelled)
            }
            RunState::Running => matches!(
                next,
                RunState::Paused | RunState::Completed | RunState::Failed | RunState::Cancelled
            ),
            RunState::Paused => matches!(next, RunState::Running | RunState::Cancelled),
            RunState::Completed | RunState::Failed | RunState::Cancelled => false,
        }
    }
}

/// State of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Active,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

crate::simple_display! {
    StepState {
        Pending => "pending",
        Active => "active",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
        Cancelled => "cancelled",
    }
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Failed | StepState::Skipped | StepState::Cancelled
        )
    }

    /// A step counts toward run completion when it finished without failing.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, StepState::Completed | StepState::Skipped)
    }
}

/// Status record for one step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatus {
    pub id: String,
    pub name: String,
    pub state: StepState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    pub progress_percent: f64,
}

impl StepStatus {
    fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: StepState::Pending,
            attempts: 0,
            started_at_ms: None,
            finished_at_ms: None,
            error: None,
            progress_percent: 0.0,
        }
    }
}

/// Violation of the run or step state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("illegal run transition: {from} -> {to}")]
    InvalidRun { from: RunState, to: RunState },

    #[error("step index {0} out of range")]
    StepOutOfRange(usize),

    #[error("step {index} cannot become active: step {blocking} is not complete")]
    StepOrder { index: usize, blocking: usize },

    #[error("illegal step transition for step {index}: {from} -> {to}")]
    InvalidStep { index: usize, from: StepState, to: StepState },
}

/// One execution of an operation definition.
///
/// Owned by the manager; observers only ever see cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub definition_id: String,
    pub state: RunState,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    pub params: serde_json::Value,
    pub step_states: Vec<StepStatus>,
    /// Terminal error summary, set when the run fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl Run {
    /// Create a pending run over the given `(step_id, step_name)` list.
    pub fn new(
        id: RunId,
        definition_id: impl Into<String>,
        steps: impl IntoIterator<Item = (String, String)>,
        params: serde_json::Value,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            definition_id: definition_id.into(),
            state: RunState::Pending,
            created_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            params,
            step_states: steps.into_iter().map(|(id, name)| StepStatus::new(id, name)).collect(),
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a top-level transition, stamping start/finish times.
    pub fn transition(&mut self, to: RunState, epoch_ms: u64) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError::InvalidRun { from: self.state, to });
        }
        if to == RunState::Running && self.started_at_ms.is_none() {
            self.started_at_ms = Some(epoch_ms);
        }
        if to.is_terminal() {
            self.finished_at_ms = Some(epoch_ms);
        }
        self.state = to;
        Ok(())
    }

    fn step_mut(&mut self, index: usize) -> Result<&mut StepStatus, TransitionError> {
        self.step_states.get_mut(index).ok_or(TransitionError::StepOutOfRange(index))
    }

    /// Mark a step active. Enforces strict-prefix ordering: every earlier
    /// step must already be satisfied.
    pub fn step_started(&mut self, index: usize, epoch_ms: u64) -> Result<(), TransitionError> {
        if let Some(blocking) =
            self.step_states.iter().take(index).position(|s| !s.state.is_satisfied())
        {
            return Err(TransitionError::StepOrder { index, blocking });
        }
        let step = self.step_mut(index)?;
        match step.state {
            // Active -> Active is a retry of the same step
            StepState::Pending | StepState::Active => {
                step.state = StepState::Active;
                step.attempts += 1;
                if step.started_at_ms.is_none() {
                    step.started_at_ms = Some(epoch_ms);
                }
                Ok(())
            }
            from => {
                Err(TransitionError::InvalidStep { index, from, to: StepState::Active })
            }
        }
    }

    /// Update progress for an active step. Clamped to [0, 100] and
    /// non-decreasing for the lifetime of the step.
    pub fn step_progress(&mut self, index: usize, percent: f64) -> Result<f64, TransitionError> {
        let step = self.step_mut(index)?;
        if step.state != StepState::Active {
            return Err(TransitionError::InvalidStep {
                index,
                from: step.state,
                to: StepState::Active,
            });
        }
        let clamped = percent.clamp(0.0, 100.0);
        if clamped > step.progress_percent {
            step.progress_percent = clamped;
        }
        Ok(step.progress_percent)
    }

    pub fn step_completed(&mut self, index: usize, epoch_ms: u64) -> Result<(), TransitionError> {
        let step = self.step_mut(index)?;
        if step.state != StepState::Active {
            return Err(TransitionError::InvalidStep {
                index,
                from: step.state,
                to: StepState::Completed,
            });
        }
        step.state = StepState::Completed;
        step.progress_percent = 100.0;
        step.finished_at_ms = Some(epoch_ms);
        Ok(())
    }

    pub fn step_failed(
        &mut self,
        index: usize,
        error: StepError,
        epoch_ms: u64,
    ) -> Result<(), TransitionError> {
        let step = self.step_mut(index)?;
        if step.state != StepState::Active {
            return Err(TransitionError::InvalidStep {
                index,
                from: step.state,
                to: StepState::Failed,
            });
        }
        step.state = StepState::Failed;
        step.finished_at_ms = Some(epoch_ms);
        step.error = Some(error.clone());
        self.error = Some(error);
        Ok(())
    }

    /// Mark a pending step skipped (its skip guard fired before activation).
    pub fn step_skipped(&mut self, index: usize, epoch_ms: u64) -> Result<(), TransitionError> {
        let step = self.step_mut(index)?;
        if step.state != StepState::Pending {
            return Err(TransitionError::InvalidStep {
                index,
                from: step.state,
                to: StepState::Skipped,
            });
        }
        step.state = StepState::Skipped;
        step.finished_at_ms = Some(epoch_ms);
        Ok(())
    }

    /// Cancel every step that has not yet reached a terminal state.
    /// Used when a cancel is honored mid-run.
    pub fn cancel_remaining_steps(&mut self, epoch_ms: u64) {
        for step in &mut self.step_states {
            if !step.state.is_terminal() {
                step.state = StepState::Cancelled;
                step.finished_at_ms = Some(epoch_ms);
            }
        }
    }

    /// True when every step is completed or skipped.
    pub fn all_steps_satisfied(&self) -> bool {
        self.step_states.iter().all(|s| s.state.is_satisfied())
    }

    /// Attempts recorded for a step, 0 if out of range.
    pub fn step_attempts(&self, index: usize) -> u32 {
        self.step_states.get(index).map(|s| s.attempts).unwrap_or(0)
    }
}

crate::builder! {
    pub struct RunBuilder => Run {
        into {
            definition_id: String = "report",
        }
        set {
            state: RunState = RunState::Pending,
            params: serde_json::Value = serde_json::Value::Object(serde_json::Map::new()),
            step_states: Vec<StepStatus> = vec![
                StepStatus::new("scrape", "Scrape"),
                StepStatus::new("parse", "Parse"),
            ],
            created_at_ms: u64 = 1_000_000,
        }
        option {
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
            error: StepError = None,
        }
        computed {
            id: RunId = RunId::new(),
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
