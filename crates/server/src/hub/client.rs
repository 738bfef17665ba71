// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client WebSocket session.
//!
//! The writer task drains the client's bounded buffer onto the socket
//! under a write deadline and sends keepalive pings; the reader watches
//! for peer close and client pongs. When the hub evicts a client its
//! buffer closes, which tears the session down.

use crate::state::SharedState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use pulse_core::{ClientId, Envelope, Event};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// `GET /ws` upgrade endpoint.
pub async fn ws_handler(State(state): State<SharedState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_session(state, socket))
}

async fn client_session(state: SharedState, socket: WebSocket) {
    let client_id = ClientId::new();
    let config = state.hub.config().clone();
    let clock = state.hub.clock().clone();

    let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(config.send_buffer.max(1));
    state.hub.register(client_id, out_tx).await;

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + config.ping_interval;
        let mut ping = tokio::time::interval_at(start, config.ping_interval);
        loop {
            tokio::select! {
                envelope = out_rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    let Ok(json) = serde_json::to_string(&envelope) else { continue };
                    match tokio::time::timeout(
                        config.write_timeout,
                        sink.send(Message::Text(json.into())),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        _ => break,
                    }
                }
                _ = ping.tick() => {
                    let keepalive = Envelope::new(Event::Ping, clock.epoch_ms(), None);
                    let Ok(json) = serde_json::to_string(&keepalive) else { continue };
                    match tokio::time::timeout(
                        config.write_timeout,
                        sink.send(Message::Text(json.into())),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        _ => break,
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(Event::Pong) = serde_json::from_str::<Event>(&text) {
                        trace!(client = %client_id, "pong");
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut writer => break,
        }
    }

    state.hub.unregister(client_id).await;
    writer.abort();
    debug!(client = %client_id, "session ended");
}
