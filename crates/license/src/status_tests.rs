// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    active        = { LicenseStatus::Active, true },
    warning       = { LicenseStatus::Warning, true },
    expired       = { LicenseStatus::Expired, false },
    not_activated = { LicenseStatus::NotActivated, false },
    revoked       = { LicenseStatus::Revoked, false },
    unknown       = { LicenseStatus::Unknown, false },
)]
fn only_active_and_warning_admit(status: LicenseStatus, admits: bool) {
    assert_eq!(status.admits(), admits);
}

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&LicenseStatus::NotActivated).unwrap();
    assert_eq!(json, "\"not_activated\"");
    let parsed: LicenseStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, LicenseStatus::NotActivated);
}

#[yare::parameterized(
    healthy      = { 120, LicenseStatus::Active },
    edge_of_warn = { 30, LicenseStatus::Active },
    expiring     = { 29, LicenseStatus::Warning },
    last_day     = { 0, LicenseStatus::Warning },
    expired      = { -1, LicenseStatus::Expired },
)]
fn days_left_drives_status(days: i64, expected: LicenseStatus) {
    let info = LicenseInfo::from_days_left(days);
    assert_eq!(info.status, expected);
    assert_eq!(info.days_left, Some(days));
}

#[test]
fn info_omits_days_when_unknown() {
    let info = LicenseInfo::new(LicenseStatus::Unknown, None, "no probe yet");
    let json = serde_json::to_value(&info).unwrap();
    assert!(json.get("days_left").is_none());
    assert_eq!(json["status"], "unknown");
}
