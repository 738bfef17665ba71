// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pulse-server: HTTP surface and realtime hub for the Pulse control plane.

pub mod config;
pub mod gate;
pub mod handlers;
pub mod hub;
pub mod pipeline;
pub mod problem;
pub mod router;
pub mod state;
pub mod trace;

pub use config::ServerConfig;
pub use hub::{Hub, HubConfig};
pub use problem::Problem;
pub use router::router;
pub use state::{AppState, SharedState};
