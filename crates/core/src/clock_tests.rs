// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_epoch_is_nonzero() {
    let clock = SystemClock;
    assert!(clock.epoch_ms() > 0);
}

#[test]
fn fake_clock_advances_instant_and_epoch() {
    let clock = FakeClock::new();
    let start = clock.now();
    let epoch = clock.epoch_ms();

    clock.advance(Duration::from_millis(1500));

    assert_eq!(clock.now() - start, Duration::from_millis(1500));
    assert_eq!(clock.epoch_ms(), epoch + 1500);
}

#[test]
fn fake_clock_set_epoch_ms() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn fake_clock_clones_share_state() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(clock.epoch_ms(), other.epoch_ms());
}
