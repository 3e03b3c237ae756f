// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-socket event loop and the inbound request pipeline.
//!
//! Inbound frames run through decode, `socket_id` injection, the middleware
//! chain, and the synchronization gate, one at a time per socket. Outbound
//! frames (responses, pushes, pings) arrive through the connection's queue
//! from any thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::connection::{ConnectionHandle, ConnectionId, Outbound};
use crate::error::MessageType;
use crate::gate;
use crate::protocol::{decode, Response};
use crate::state::ServerState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<ServerState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut outbound) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(ConnectionId::next(), tx);
    open_connection(&state, &handle);
    let shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(message) = frame.and_then(to_ws) else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match msg {
                    Message::Text(text) => {
                        let state = Arc::clone(&state);
                        let conn = handle.clone();
                        let text = text.to_string();
                        // Handlers may block (inline steps, compilation).
                        let joined = tokio::task::spawn_blocking(move || receive(&state, &conn, &text)).await;
                        if let Err(e) = joined {
                            error!(conn = %handle.id(), "request task failed: {e}");
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = shutdown.cancelled() => {
                // Flush what is already queued, e.g. the `exit` response.
                while let Ok(frame) = outbound.try_recv() {
                    match to_ws(frame) {
                        Some(message) => {
                            if ws_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    close_connection(&state, &handle);
}

fn to_ws(frame: Outbound) -> Option<Message> {
    match frame {
        Outbound::Text(text) => Some(Message::Text(text.into())),
        Outbound::Ping => Some(Message::Ping(Bytes::new())),
        Outbound::Close => None,
    }
}

/// Greet a new connection and start its heartbeat.
pub fn open_connection(state: &ServerState, handle: &ConnectionHandle) {
    handle.send(&Response::connected(handle.id().to_string()));
    state.connections.accept(handle.clone(), state.config.ping_interval());
    info!(conn = %handle.id(), "connected");
}

/// Forget a connection. Its experiments are paused and closed, or detached
/// for a later client when `--detach-on-close` is set.
pub fn close_connection(state: &ServerState, handle: &ConnectionHandle) {
    state.connections.disconnect(handle.id());
    if state.config.detach_on_close {
        let detached = state.messenger.detach(handle.id());
        info!(conn = %handle.id(), detached = detached.len(), "disconnected");
        return;
    }
    let owned = state.messenger.owned_by(handle.id());
    for exp_id in &owned {
        if let Some(experiment) = state.experiments.get(exp_id) {
            experiment.controller.process_pause(true);
        }
        state.dispose(exp_id);
    }
    info!(conn = %handle.id(), closed = owned.len(), "disconnected");
}

/// Handle one inbound text frame. Never panics: any fault is answered with
/// `GamaServerError` and the connection stays open.
pub fn receive(state: &Arc<ServerState>, connection: &ConnectionHandle, raw: &str) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline(state, connection, raw)));
    if outcome.is_err() {
        error!(conn = %connection.id(), "request pipeline panicked");
        connection.send(&Response::new(
            MessageType::GamaServerError,
            "unexpected failure while processing the request",
        ));
    }
}

fn pipeline(state: &Arc<ServerState>, connection: &ConnectionHandle, raw: &str) {
    let mut message = match decode(raw) {
        Ok(message) => message,
        Err(e) => {
            debug!(conn = %connection.id(), "malformed frame: {e}");
            connection.send(&Response::new(e.kind, e.content));
            return;
        }
    };
    message.inject("socket_id", connection.id().to_string());
    if !state.middleware.process(&mut message) {
        return;
    }
    gate::dispatch(state, connection, message);
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
