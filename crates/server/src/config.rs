// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server.
//!
//! Every knob is a `PULSE_*` variable with a default that works for a
//! local single-machine install. Unparseable values fall back to the
//! default rather than aborting startup.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port (`PULSE_PORT`).
    pub port: u16,
    /// Machine identity used as the license cache key (`PULSE_MACHINE_ID`).
    pub machine_id: String,

    /// Whole-run budget (`PULSE_OPERATION_TIMEOUT_MS`).
    pub operation_timeout: Duration,
    /// Queue worker count (`PULSE_WORKERS`).
    pub workers: usize,
    /// Queue admission capacity (`PULSE_QUEUE_CAPACITY`).
    pub queue_capacity: usize,
    /// Drain budget for graceful shutdown (`PULSE_SHUTDOWN_TIMEOUT_MS`).
    pub shutdown_timeout: Duration,

    /// Rate-limit knobs, consumed by the fronting proxy config
    /// (`PULSE_RATE_LIMIT_RPS`, `PULSE_RATE_LIMIT_BURST`).
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,

    /// License file location (`PULSE_LICENSE_PATH`).
    pub license_path: PathBuf,
    /// Where steps may leave data and reports (`PULSE_DATA_DIR`,
    /// `PULSE_REPORTS_DIR`).
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
    /// Directory for the server log file (`PULSE_LOG_DIR`).
    pub log_dir: PathBuf,

    /// Allowed browser origins (`PULSE_ALLOWED_ORIGINS`, comma-separated;
    /// empty means same-host tools only).
    pub allowed_origins: Vec<String>,

    /// Realtime client keepalive cadence (`PULSE_PING_INTERVAL_MS`).
    pub ping_interval: Duration,
    /// Per-message socket write deadline (`PULSE_WRITE_TIMEOUT_MS`).
    pub write_timeout: Duration,
    /// Per-client outbound buffer, in messages (`PULSE_SEND_BUFFER`).
    pub send_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            machine_id: "local".to_string(),
            operation_timeout: Duration::from_secs(300),
            workers: 4,
            queue_capacity: 256,
            shutdown_timeout: Duration::from_secs(5),
            rate_limit_rps: 50,
            rate_limit_burst: 100,
            license_path: PathBuf::from("pulse-data/license.json"),
            data_dir: PathBuf::from("pulse-data/data"),
            reports_dir: PathBuf::from("pulse-data/reports"),
            log_dir: PathBuf::from("pulse-data/logs"),
            allowed_origins: Vec::new(),
            ping_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            send_buffer: 256,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PULSE_PORT", defaults.port),
            machine_id: env_string("PULSE_MACHINE_ID", defaults.machine_id),
            operation_timeout: env_duration_ms(
                "PULSE_OPERATION_TIMEOUT_MS",
                defaults.operation_timeout,
            ),
            workers: env_parse("PULSE_WORKERS", defaults.workers),
            queue_capacity: env_parse("PULSE_QUEUE_CAPACITY", defaults.queue_capacity),
            shutdown_timeout: env_duration_ms(
                "PULSE_SHUTDOWN_TIMEOUT_MS",
                defaults.shutdown_timeout,
            ),
            rate_limit_rps: env_parse("PULSE_RATE_LIMIT_RPS", defaults.rate_limit_rps),
            rate_limit_burst: env_parse("PULSE_RATE_LIMIT_BURST", defaults.rate_limit_burst),
            license_path: env_path("PULSE_LICENSE_PATH", defaults.license_path),
            data_dir: env_path("PULSE_DATA_DIR", defaults.data_dir),
            reports_dir: env_path("PULSE_REPORTS_DIR", defaults.reports_dir),
            log_dir: env_path("PULSE_LOG_DIR", defaults.log_dir),
            allowed_origins: env_list("PULSE_ALLOWED_ORIGINS"),
            ping_interval: env_duration_ms("PULSE_PING_INTERVAL_MS", defaults.ping_interval),
            write_timeout: env_duration_ms("PULSE_WRITE_TIMEOUT_MS", defaults.write_timeout),
            send_buffer: env_parse("PULSE_SEND_BUFFER", defaults.send_buffer),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).ok().filter(|s| !s.is_empty()).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|s| {
            s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
