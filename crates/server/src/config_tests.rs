// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear_pulse_env() {
    let keys: Vec<String> =
        std::env::vars().map(|(key, _)| key).filter(|k| k.starts_with("PULSE_")).collect();
    for key in keys {
        std::env::remove_var(&key);
    }
}

#[test]
#[serial]
fn defaults_apply_without_env() {
    clear_pulse_env();
    let config = ServerConfig::from_env();
    assert_eq!(config.port, 8090);
    assert_eq!(config.workers, 4);
    assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    assert!(config.allowed_origins.is_empty());
}

#[test]
#[serial]
fn env_overrides_are_read() {
    clear_pulse_env();
    std::env::set_var("PULSE_PORT", "9999");
    std::env::set_var("PULSE_WORKERS", "2");
    std::env::set_var("PULSE_OPERATION_TIMEOUT_MS", "1500");
    std::env::set_var("PULSE_MACHINE_ID", "bench-03");

    let config = ServerConfig::from_env();
    assert_eq!(config.port, 9999);
    assert_eq!(config.workers, 2);
    assert_eq!(config.operation_timeout, Duration::from_millis(1500));
    assert_eq!(config.machine_id, "bench-03");
    clear_pulse_env();
}

#[test]
#[serial]
fn unparseable_values_fall_back_to_defaults() {
    clear_pulse_env();
    std::env::set_var("PULSE_PORT", "not-a-port");
    std::env::set_var("PULSE_WORKERS", "-3");

    let config = ServerConfig::from_env();
    assert_eq!(config.port, 8090);
    assert_eq!(config.workers, 4);
    clear_pulse_env();
}

#[test]
#[serial]
fn origin_list_is_split_and_trimmed() {
    clear_pulse_env();
    std::env::set_var(
        "PULSE_ALLOWED_ORIGINS",
        "http://localhost:3000, https://pulse.example.com ,",
    );
    let config = ServerConfig::from_env();
    assert_eq!(
        config.allowed_origins,
        vec!["http://localhost:3000", "https://pulse.example.com"]
    );
    clear_pulse_env();
}
