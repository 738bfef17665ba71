// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state and its wiring.

use crate::config::ServerConfig;
use crate::hub::{Hub, HubConfig};
use crate::pipeline;
use pulse_core::metrics::MetricsError;
use pulse_core::{Metrics, SharedClock, SystemClock};
use pulse_engine::{
    EventBus, JobQueue, Manager, ManagerConfig, MemoryJobStore, QueueConfig,
};
use pulse_license::{FileProvider, LicenseProvider, Validator, ValidatorConfig};
use std::sync::Arc;
use std::time::Instant;

pub type SharedState = Arc<AppState>;

/// Everything the handlers need, wired once at startup. No globals: the
/// metrics registry, clock, and license cache all live here.
pub struct AppState {
    pub config: ServerConfig,
    pub manager: Manager,
    pub queue: JobQueue,
    pub validator: Validator,
    pub hub: Hub,
    pub metrics: Metrics,
    pub clock: SharedClock,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the full component graph with the default file-backed license
    /// provider. The queue is constructed but not started; the caller
    /// decides when workers come up.
    pub fn build(config: ServerConfig) -> Result<SharedState, MetricsError> {
        let clock: SharedClock = Arc::new(SystemClock);
        let provider = Arc::new(FileProvider::new(config.license_path.clone(), clock.clone()));
        Self::build_with_provider(config, provider)
    }

    /// Same wiring with a caller-supplied license provider.
    pub fn build_with_provider(
        config: ServerConfig,
        provider: Arc<dyn LicenseProvider>,
    ) -> Result<SharedState, MetricsError> {
        let clock: SharedClock = Arc::new(SystemClock);
        let metrics = Metrics::new()?;
        let bus = EventBus::default();

        let manager = Manager::new(
            bus.clone(),
            clock.clone(),
            ManagerConfig { operation_timeout: config.operation_timeout },
        );
        if let Err(err) = manager.register(pipeline::report_definition(&config.reports_dir)) {
            // Registration happens exactly once per process; a collision
            // here is a wiring bug, not a runtime condition.
            tracing::error!(%err, "built-in pipeline registration failed");
        }

        let queue = JobQueue::new(
            manager.clone(),
            Arc::new(MemoryJobStore::new()),
            clock.clone(),
            metrics.queue.clone(),
            QueueConfig { workers: config.workers, capacity: config.queue_capacity },
        );

        let validator = Validator::new(provider, clock.clone(), ValidatorConfig::default());

        let hub = Hub::spawn(
            &bus,
            metrics.hub.clone(),
            clock.clone(),
            HubConfig {
                send_buffer: config.send_buffer,
                ping_interval: config.ping_interval,
                write_timeout: config.write_timeout,
            },
        );

        Ok(Arc::new(AppState {
            config,
            manager,
            queue,
            validator,
            hub,
            metrics,
            clock,
            started_at: Instant::now(),
        }))
    }

    /// Readiness: admission open, workers spawned, and the hub loop
    /// alive.
    pub fn is_ready(&self) -> bool {
        self.queue.is_accepting() && self.queue.is_running() && self.hub.is_alive()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
