// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime hub: fan-out of engine events to WebSocket clients.
//!
//! One loop task owns the client set; everything external talks to it
//! through channels. Each client gets a bounded outbound buffer drained
//! by its own writer task, so a slow socket can only ever cost its own
//! connection.

mod client;

pub use client::ws_handler;

use pulse_core::metrics::HubMetrics;
use pulse_core::{ClientId, Envelope, Event, SharedClock};
use pulse_engine::EventBus;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Realtime knobs, taken from server config at startup.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-client outbound buffer, in messages.
    pub send_buffer: usize,
    /// Keepalive ping cadence.
    pub ping_interval: Duration,
    /// Per-message socket write deadline.
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_buffer: 256,
            ping_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
        }
    }
}

enum Command {
    Register { client_id: ClientId, sender: mpsc::Sender<Envelope> },
    Unregister { client_id: ClientId },
}

/// Handle to the hub loop.
#[derive(Clone)]
pub struct Hub {
    cmd_tx: mpsc::Sender<Command>,
    clock: SharedClock,
    config: HubConfig,
    alive: watch::Receiver<bool>,
}

impl Hub {
    /// Spawn the fan-out loop over a bus subscription.
    pub fn spawn(
        bus: &EventBus,
        metrics: HubMetrics,
        clock: SharedClock,
        config: HubConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (alive_tx, alive_rx) = watch::channel(true);
        let bus_rx = bus.subscribe();
        tokio::spawn(hub_loop(cmd_rx, bus_rx, metrics, clock.clone(), alive_tx));
        Self { cmd_tx, clock, config, alive: alive_rx }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// True while the fan-out loop is running. Feeds readiness.
    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Watch handle that flips to `false` when the loop exits.
    pub fn liveness(&self) -> watch::Receiver<bool> {
        self.alive.clone()
    }

    pub(crate) fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Attach a client. Its `connection` handshake is queued before any
    /// broadcast that follows.
    pub async fn register(&self, client_id: ClientId, sender: mpsc::Sender<Envelope>) {
        let _ = self.cmd_tx.send(Command::Register { client_id, sender }).await;
    }

    pub async fn unregister(&self, client_id: ClientId) {
        let _ = self.cmd_tx.send(Command::Unregister { client_id }).await;
    }
}

/// Flips the liveness flag when the loop exits on any path, including
/// unwind.
struct AliveGuard(watch::Sender<bool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        let _ = self.0.send(false);
    }
}

async fn hub_loop(
    mut cmd_rx: mpsc::Receiver<Command>,
    mut bus_rx: tokio::sync::broadcast::Receiver<Envelope>,
    metrics: HubMetrics,
    clock: SharedClock,
    alive: watch::Sender<bool>,
) {
    let _alive = AliveGuard(alive);
    let mut clients: HashMap<ClientId, mpsc::Sender<Envelope>> = HashMap::new();
    let mut bus_open = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None => break,
                Some(Command::Register { client_id, sender }) => {
                    let hello = Envelope::new(
                        Event::Connection { status: "connected".to_string(), client_id },
                        clock.epoch_ms(),
                        None,
                    );
                    // The handshake rides the same buffer as broadcasts,
                    // so per-client FIFO makes it the first message out.
                    if sender.try_send(hello).is_ok() {
                        clients.insert(client_id, sender);
                        metrics.total_connections.inc();
                        metrics.messages_sent.inc();
                        metrics.active_clients.set(clients.len() as i64);
                        debug!(client = %client_id, total = clients.len(), "client connected");
                    }
                }
                Some(Command::Unregister { client_id }) => {
                    if clients.remove(&client_id).is_some() {
                        metrics.active_clients.set(clients.len() as i64);
                        debug!(client = %client_id, "client disconnected");
                    }
                }
            },
            result = bus_rx.recv(), if bus_open => match result {
                Ok(envelope) => {
                    trace!(event = envelope.event.kind(), clients = clients.len(), "fan out");
                    let mut evicted = Vec::new();
                    let mut gone = Vec::new();
                    for (client_id, sender) in &clients {
                        match sender.try_send(envelope.clone()) {
                            Ok(()) => metrics.messages_sent.inc(),
                            Err(mpsc::error::TrySendError::Full(_)) => evicted.push(*client_id),
                            Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*client_id),
                        }
                    }
                    for client_id in evicted {
                        // Dropping the sender closes the client's writer.
                        clients.remove(&client_id);
                        metrics.evictions.inc();
                        debug!(client = %client_id, "client evicted: send buffer full");
                    }
                    for client_id in gone {
                        clients.remove(&client_id);
                    }
                    metrics.active_clients.set(clients.len() as i64);
                }
                Err(RecvError::Lagged(n)) => {
                    metrics.messages_dropped.inc_by(n);
                }
                Err(RecvError::Closed) => bus_open = false,
            },
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
