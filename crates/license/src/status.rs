// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! License status model.

use serde::{Deserialize, Serialize};

/// Days before expiry at which a license starts reporting `Warning`.
pub const WARNING_WINDOW_DAYS: i64 = 30;

/// Verdict on the machine's license. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    /// Valid but expiring within [`WARNING_WINDOW_DAYS`].
    Warning,
    Expired,
    NotActivated,
    Revoked,
    Unknown,
}

pulse_core::simple_display! {
    LicenseStatus {
        Active => "active",
        Warning => "warning",
        Expired => "expired",
        NotActivated => "not_activated",
        Revoked => "revoked",
        Unknown => "unknown",
    }
}

impl LicenseStatus {
    /// Whether requests are admitted under this status.
    pub fn admits(&self) -> bool {
        matches!(self, LicenseStatus::Active | LicenseStatus::Warning)
    }
}

/// Full status report, as served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub status: LicenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_left: Option<i64>,
    pub message: String,
}

impl LicenseInfo {
    pub fn new(status: LicenseStatus, days_left: Option<i64>, message: impl Into<String>) -> Self {
        Self { status, days_left, message: message.into() }
    }

    /// Status derived from the days remaining until expiry.
    pub fn from_days_left(days_left: i64) -> Self {
        if days_left < 0 {
            Self::new(LicenseStatus::Expired, Some(days_left), "license has expired")
        } else if days_left < WARNING_WINDOW_DAYS {
            Self::new(
                LicenseStatus::Warning,
                Some(days_left),
                format!("license expires in {days_left} days"),
            )
        } else {
            Self::new(LicenseStatus::Active, Some(days_left), "license is active")
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
