// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step retry policy with capped exponential backoff.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry budget for a single step.
///
/// `max_attempts` counts executions, not retries: a policy of 2 runs the
/// step at most twice. The backoff wait doubles per attempt and is capped
/// at `backoff_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub backoff_base: Duration,
    #[serde(with = "duration_ms")]
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self { max_attempts, backoff_base, backoff_max }
    }

    /// Whether another execution is allowed after `attempts` completed tries.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff wait before the next execution, after `attempts` completed
    /// tries. `min(backoff_base * 2^attempts, backoff_max)`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let shift = attempts.min(32);
        let factor = 1u64 << shift.min(63);
        let delay = self
            .backoff_base
            .checked_mul(factor.min(u32::MAX as u64) as u32)
            .unwrap_or(self.backoff_max);
        delay.min(self.backoff_max)
    }
}

/// Serialize a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
