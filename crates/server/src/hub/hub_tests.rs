// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pulse_core::{FakeClock, Metrics, RunId};
use std::sync::Arc;

struct Fixture {
    hub: Hub,
    bus: EventBus,
    metrics: Metrics,
}

fn fixture_with_bus(capacity: usize) -> Fixture {
    let bus = EventBus::new(capacity);
    let metrics = Metrics::new().unwrap();
    let hub = Hub::spawn(
        &bus,
        metrics.hub.clone(),
        Arc::new(FakeClock::new()),
        HubConfig::default(),
    );
    Fixture { hub, bus, metrics }
}

fn fixture() -> Fixture {
    fixture_with_bus(1024)
}

fn started(n: u64) -> Envelope {
    Envelope::new(
        Event::OperationStarted {
            run_id: RunId::from_string(format!("run-{n}")),
            definition_id: "report".to_string(),
        },
        n,
        None,
    )
}

async fn connect(hub: &Hub, buffer: usize) -> (ClientId, mpsc::Receiver<Envelope>) {
    let client_id = ClientId::new();
    let (tx, rx) = mpsc::channel(buffer);
    hub.register(client_id, tx).await;
    (client_id, rx)
}

/// Let the hub loop drain whatever is queued.
async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
}

#[tokio::test]
async fn first_message_is_the_connection_handshake() {
    let fx = fixture();
    let (client_id, mut rx) = connect(&fx.hub, 8).await;

    fx.bus.publish(started(1));
    settle().await;

    let first = rx.recv().await.unwrap();
    match first.event {
        Event::Connection { status, client_id: id } => {
            assert_eq!(status, "connected");
            assert_eq!(id, client_id);
        }
        other => panic!("expected connection first, got {other:?}"),
    }

    let second = rx.recv().await.unwrap();
    assert_eq!(second.event.kind(), "operation:started");
}

#[tokio::test]
async fn broadcasts_arrive_in_publish_order() {
    let fx = fixture();
    let (_, mut rx) = connect(&fx.hub, 64).await;
    settle().await;

    for n in 0..20 {
        fx.bus.publish(started(n));
    }
    settle().await;

    let _hello = rx.recv().await.unwrap();
    for n in 0..20u64 {
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.timestamp.timestamp_millis() as u64, n);
    }
}

#[tokio::test]
async fn slow_client_is_evicted_and_others_keep_receiving() {
    let fx = fixture();
    // Tiny buffer, never drained: 3 slots + handshake.
    let (_, slow_rx) = connect(&fx.hub, 4).await;
    let (_, mut healthy_rx) = connect(&fx.hub, 64).await;
    settle().await;
    assert_eq!(fx.metrics.hub.active_clients.get(), 2);

    for n in 0..10 {
        fx.bus.publish(started(n));
        settle().await;
    }

    assert_eq!(fx.metrics.hub.evictions.get(), 1);
    assert_eq!(fx.metrics.hub.active_clients.get(), 1);

    // The healthy client saw everything, in order.
    let _hello = healthy_rx.recv().await.unwrap();
    for n in 0..10u64 {
        let envelope = healthy_rx.recv().await.unwrap();
        assert_eq!(envelope.timestamp.timestamp_millis() as u64, n);
    }

    drop(slow_rx);
}

#[tokio::test]
async fn eviction_closes_the_client_channel() {
    let fx = fixture();
    let (_, mut rx) = connect(&fx.hub, 1).await;
    settle().await;

    // Handshake fills the single slot; the next broadcast evicts.
    fx.bus.publish(started(1));
    settle().await;

    let _hello = rx.recv().await.unwrap();
    assert!(rx.recv().await.is_none(), "evicted client channel should close");
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let fx = fixture();
    let (client_id, rx) = connect(&fx.hub, 8).await;
    settle().await;
    assert_eq!(fx.metrics.hub.active_clients.get(), 1);

    fx.hub.unregister(client_id).await;
    fx.hub.unregister(client_id).await;
    settle().await;
    assert_eq!(fx.metrics.hub.active_clients.get(), 0);
    assert_eq!(fx.metrics.hub.total_connections.get(), 1);

    drop(rx);
}

#[tokio::test]
async fn liveness_flips_when_the_loop_exits() {
    let fx = fixture();
    assert!(fx.hub.is_alive());

    // Dropping the last handle closes the command channel; the loop
    // exits and the watch flips.
    let mut liveness = fx.hub.liveness();
    drop(fx.hub);
    let _ = liveness.changed().await;
    assert!(!*liveness.borrow());
}

#[tokio::test]
async fn paused_client_under_load_is_evicted_while_the_rest_get_everything() {
    const CLIENTS: usize = 50;
    const EVENTS: u64 = 1000;
    const BUFFER: usize = 256;

    let fx = fixture();

    // Healthy clients drain concurrently with the broadcast.
    let mut readers = Vec::new();
    for _ in 0..CLIENTS {
        let (_, mut rx) = connect(&fx.hub, BUFFER).await;
        readers.push(tokio::spawn(async move {
            let mut got = Vec::with_capacity(EVENTS as usize + 1);
            while got.len() < EVENTS as usize + 1 {
                match rx.recv().await {
                    Some(envelope) => got.push(envelope),
                    None => break,
                }
            }
            got
        }));
    }
    // One client never reads.
    let (_, mut paused_rx) = connect(&fx.hub, BUFFER).await;
    settle().await;
    assert_eq!(fx.metrics.hub.active_clients.get(), CLIENTS as i64 + 1);

    for n in 0..EVENTS {
        fx.bus.publish(started(n));
        tokio::task::yield_now().await;
    }
    settle().await;

    assert_eq!(fx.metrics.hub.evictions.get(), 1);
    assert_eq!(fx.metrics.hub.active_clients.get(), CLIENTS as i64);

    for reader in readers {
        let got = reader.await.unwrap();
        assert_eq!(got.len(), EVENTS as usize + 1);
        assert_eq!(got[0].event.kind(), "connection");
        for (n, envelope) in got[1..].iter().enumerate() {
            assert_eq!(envelope.timestamp.timestamp_millis() as u64, n as u64);
        }
    }

    // The paused client kept its handshake plus one buffer of backlog,
    // then its channel closed.
    let mut buffered = 0;
    while paused_rx.recv().await.is_some() {
        buffered += 1;
    }
    assert_eq!(buffered, BUFFER);
}

#[tokio::test]
async fn lagging_ingress_is_counted_as_dropped() {
    // Current-thread runtime: publishing without awaiting starves the hub
    // loop, so a tiny bus ring is guaranteed to lag.
    let fx = fixture_with_bus(4);
    let (_, mut rx) = connect(&fx.hub, 64).await;
    settle().await;

    for n in 0..20 {
        fx.bus.publish(started(n));
    }
    settle().await;

    assert_eq!(fx.metrics.hub.messages_dropped.get(), 16);

    // The newest four made it through, in order.
    let _hello = rx.recv().await.unwrap();
    for n in 16..20u64 {
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.timestamp.timestamp_millis() as u64, n);
    }
}
