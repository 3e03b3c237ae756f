// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing of simulation pushes to the connection that owns each experiment.
//!
//! Each experiment has a [`ServerConfiguration`]: the attached connection and
//! the four gates chosen at load time. Configurations are replaced whole
//! (copy-on-write) when a connection attaches or detaches, so a push never
//! sees a half-updated one.

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::trace;

use crate::engine::Emission;
use crate::error::MessageType;
use crate::experiment::ExperimentState;
use crate::protocol::Response;
use crate::transport::connection::{ConnectionHandle, ConnectionId};

/// Which push categories a client wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gates {
    pub console: bool,
    pub status: bool,
    pub dialog: bool,
    pub runtime: bool,
}

impl Default for Gates {
    fn default() -> Self {
        Self { console: true, status: true, dialog: true, runtime: true }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfiguration {
    pub exp_id: String,
    pub connection: Option<ConnectionHandle>,
    pub gates: Gates,
}

impl ServerConfiguration {
    pub fn new(exp_id: impl Into<String>, connection: ConnectionHandle, gates: Gates) -> Self {
        Self { exp_id: exp_id.into(), connection: Some(connection), gates }
    }

    pub fn with_connection(&self, connection: ConnectionHandle) -> Self {
        Self { connection: Some(connection), ..self.clone() }
    }

    pub fn detached(&self) -> Self {
        Self { connection: None, ..self.clone() }
    }

    pub fn owner(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }

    /// The owning connection, if it is still open.
    pub fn live_connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref().filter(|c| c.is_open())
    }
}

/// A message a simulation sends on its own initiative.
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Status(ExperimentState),
    Output(String),
    Debug(String),
    Dialog(String),
    StatusInform(String),
    StatusError(String),
    RuntimeError(String),
    Ended { cycle: u64 },
}

impl Push {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Status(_) => MessageType::SimulationStatus,
            Self::Output(_) => MessageType::SimulationOutput,
            Self::Debug(_) => MessageType::SimulationDebug,
            Self::Dialog(_) => MessageType::SimulationDialog,
            Self::StatusInform(_) => MessageType::SimulationStatusInform,
            Self::StatusError(_) => MessageType::SimulationStatusError,
            Self::RuntimeError(_) => MessageType::RuntimeError,
            Self::Ended { .. } => MessageType::SimulationEnded,
        }
    }

    /// State changes and the end of a run are always delivered.
    pub fn allowed_by(&self, gates: &Gates) -> bool {
        match self {
            Self::Status(_) | Self::Ended { .. } => true,
            Self::Output(_) | Self::Debug(_) => gates.console,
            Self::Dialog(_) => gates.dialog,
            Self::StatusInform(_) | Self::StatusError(_) => gates.status,
            Self::RuntimeError(_) => gates.runtime,
        }
    }

    fn content(self) -> Value {
        match self {
            Self::Status(state) => Value::String(state.as_str().to_owned()),
            Self::Output(text)
            | Self::Debug(text)
            | Self::Dialog(text)
            | Self::StatusInform(text)
            | Self::StatusError(text)
            | Self::RuntimeError(text) => Value::String(text),
            Self::Ended { cycle } => json!({ "cycle": cycle }),
        }
    }
}

impl From<Emission> for Push {
    fn from(emission: Emission) -> Self {
        match emission {
            Emission::Write(text) => Self::Output(text),
            Emission::Debug(text) => Self::Debug(text),
            Emission::Tell(text) => Self::Dialog(text),
        }
    }
}

#[derive(Default)]
pub struct Messenger {
    configs: DashMap<String, ServerConfiguration>,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, config: ServerConfiguration) {
        self.configs.insert(config.exp_id.clone(), config);
    }

    pub fn remove(&self, exp_id: &str) -> Option<ServerConfiguration> {
        self.configs.remove(exp_id).map(|(_, config)| config)
    }

    pub fn configuration(&self, exp_id: &str) -> Option<ServerConfiguration> {
        self.configs.get(exp_id).map(|entry| entry.value().clone())
    }

    /// Route future pushes of `exp_id` to `connection`.
    pub fn reattach(&self, exp_id: &str, connection: &ConnectionHandle) {
        if let Some(mut entry) = self.configs.get_mut(exp_id) {
            let updated = entry.value().with_connection(connection.clone());
            *entry.value_mut() = updated;
        }
    }

    /// Detach `connection` from every experiment it owns and return their ids.
    pub fn detach(&self, connection: ConnectionId) -> Vec<String> {
        let mut detached = vec![];
        for mut entry in self.configs.iter_mut() {
            if entry.value().owner() == Some(connection) {
                let updated = entry.value().detached();
                *entry.value_mut() = updated;
                detached.push(entry.key().clone());
            }
        }
        detached
    }

    /// Experiments whose pushes go to `connection`.
    pub fn owned_by(&self, connection: ConnectionId) -> Vec<String> {
        self.configs
            .iter()
            .filter(|entry| entry.value().owner() == Some(connection))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Deliver `push` for `exp_id`. Silently dropped when its gate is off or
    /// no open connection is attached.
    pub fn send(&self, exp_id: &str, push: Push) -> bool {
        let Some(config) = self.configuration(exp_id) else {
            return false;
        };
        if !push.allowed_by(&config.gates) {
            trace!(exp_id, kind = %push.message_type(), "push gated");
            return false;
        }
        let Some(connection) = config.live_connection() else {
            return false;
        };
        let kind = push.message_type();
        connection.send(&Response::push(kind, exp_id, push.content()))
    }

    pub fn flush(&self, exp_id: &str, emissions: Vec<Emission>) {
        for emission in emissions {
            self.send(exp_id, Push::from(emission));
        }
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
