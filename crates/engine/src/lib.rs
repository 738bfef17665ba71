// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pulse-engine: operation engine and job queue for the Pulse control plane.
//!
//! The manager turns registered operation definitions into runs and drives
//! their steps; the queue feeds runs to a fixed worker pool; the event bus
//! carries everything the realtime hub fans out.

pub mod bus;
pub mod context;
pub mod definition;
pub mod manager;
pub mod queue;
pub mod reporter;
pub mod step;
pub mod store;

#[cfg(test)]
mod test_support;

pub use bus::EventBus;
pub use context::OperationContext;
pub use definition::{DefinitionBuilder, DefinitionError, OperationDefinition, StepRef};
pub use manager::{Manager, ManagerConfig, ManagerError};
pub use queue::{JobPage, JobQueue, QueueConfig, QueueError, StopOutcome};
pub use reporter::Reporter;
pub use step::{FnStep, Step};
pub use store::{JobStore, MemoryJobStore};
