// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus instruments shared by the hub and the queue.
//!
//! The registry is constructed at startup and passed in; nothing here is
//! process-global.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub use prometheus::Error as MetricsError;

/// Instruments for the realtime hub.
#[derive(Clone)]
pub struct HubMetrics {
    pub active_clients: IntGauge,
    pub total_connections: IntCounter,
    pub messages_sent: IntCounter,
    pub messages_dropped: IntCounter,
    pub evictions: IntCounter,
}

/// Instruments for the job queue.
#[derive(Clone)]
pub struct QueueMetrics {
    pub jobs_running: IntGauge,
    pub jobs_finished: IntCounterVec,
}

impl QueueMetrics {
    /// Count one finished job under its terminal status label.
    pub fn record_finished(&self, status: &str) {
        self.jobs_finished.with_label_values(&[status]).inc();
    }
}

/// All instruments plus the registry they are registered in.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub hub: HubMetrics,
    pub queue: QueueMetrics,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let hub = HubMetrics {
            active_clients: IntGauge::new(
                "pulse_hub_active_clients",
                "Currently connected realtime clients",
            )?,
            total_connections: IntCounter::new(
                "pulse_hub_connections_total",
                "Realtime connections accepted since start",
            )?,
            messages_sent: IntCounter::new(
                "pulse_hub_messages_sent_total",
                "Messages delivered to client buffers",
            )?,
            messages_dropped: IntCounter::new(
                "pulse_hub_messages_dropped_total",
                "Messages dropped on hub ingress saturation",
            )?,
            evictions: IntCounter::new(
                "pulse_hub_evictions_total",
                "Clients evicted for slow consumption",
            )?,
        };
        registry.register(Box::new(hub.active_clients.clone()))?;
        registry.register(Box::new(hub.total_connections.clone()))?;
        registry.register(Box::new(hub.messages_sent.clone()))?;
        registry.register(Box::new(hub.messages_dropped.clone()))?;
        registry.register(Box::new(hub.evictions.clone()))?;

        let queue = QueueMetrics {
            jobs_running: IntGauge::new(
                "pulse_queue_jobs_running",
                "Jobs currently claimed by a worker",
            )?,
            jobs_finished: IntCounterVec::new(
                Opts::new("pulse_queue_jobs_finished_total", "Jobs finished, by terminal status"),
                &["status"],
            )?,
        };
        registry.register(Box::new(queue.jobs_running.clone()))?;
        registry.register(Box::new(queue.jobs_finished.clone()))?;

        Ok(Self { registry, hub, queue })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
