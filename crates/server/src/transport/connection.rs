// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-socket handles and the registry of open connections.
//!
//! A [`ConnectionHandle`] is cheap to clone and may be used from any thread:
//! simulation threads send pushes through it while the socket task owns the
//! actual WebSocket writer.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::encode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frames queued for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, tx, open: Arc::new(AtomicBool::new(true)) }
    }

    /// A handle plus the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(ConnectionId::next(), tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Queue a JSON message. Returns false once the connection is closed.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        self.send_frame(Outbound::Text(encode(message)))
    }

    pub fn ping(&self) -> bool {
        self.send_frame(Outbound::Ping)
    }

    /// Ask the writer to close the socket.
    pub fn close(&self) {
        self.send_frame(Outbound::Close);
        self.mark_closed();
    }

    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn send_frame(&self, frame: Outbound) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(frame).is_ok()
    }
}

/// Open connections and their heartbeat tasks.
#[derive(Default)]
pub struct Connections {
    handles: DashMap<ConnectionId, ConnectionHandle>,
    heartbeats: DashMap<ConnectionId, CancellationToken>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and, when `interval` is set, start pinging it.
    ///
    /// The first ping goes out immediately. Must be called from within a
    /// tokio runtime when `interval` is set.
    pub fn accept(&self, handle: ConnectionHandle, interval: Option<Duration>) {
        let id = handle.id();
        if let Some(interval) = interval {
            let cancel = CancellationToken::new();
            self.heartbeats.insert(id, cancel.clone());
            tokio::spawn(heartbeat(handle.clone(), interval, cancel));
        }
        self.handles.insert(id, handle);
    }

    /// Forget a connection and stop its heartbeat.
    pub fn disconnect(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        if let Some((_, cancel)) = self.heartbeats.remove(&id) {
            cancel.cancel();
        }
        let handle = self.handles.remove(&id).map(|(_, handle)| handle);
        if let Some(ref handle) = handle {
            handle.mark_closed();
        }
        handle
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.handles.get(&id).map(|entry| entry.value().clone())
    }

    /// Look a connection up by the textual id clients see.
    pub fn find(&self, socket_id: &str) -> Option<ConnectionHandle> {
        let id = socket_id.trim().parse().ok().map(ConnectionId)?;
        self.get(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.len()
    }

    /// Close every socket, e.g. on shutdown.
    pub fn close_all(&self) {
        for entry in self.handles.iter() {
            entry.value().close();
        }
    }
}

async fn heartbeat(handle: ConnectionHandle, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !handle.ping() {
                    break;
                }
            }
        }
    }
    debug!(connection = %handle.id(), "heartbeat stopped");
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
