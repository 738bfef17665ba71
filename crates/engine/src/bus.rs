// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast bus between event producers and the realtime hub.
//!
//! Producers never block: the bus is a bounded ring and a consumer that
//! falls behind skips the oldest entries. The skip count is surfaced by the
//! hub as its dropped-messages metric.

use pulse_core::Envelope;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Cloneable publish handle; receivers are created on demand.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an envelope. Non-blocking; an error only means there is no
    /// subscriber right now, which is not a producer concern.
    pub fn publish(&self, envelope: Envelope) {
        tracing::trace!(event = envelope.event.kind(), "publish");
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
