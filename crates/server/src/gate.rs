// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization gate: decides whether a request runs inline on the
//! connection task or is handed to the simulation thread of the running
//! experiment it addresses.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::command::{CommandContext, CommandKind};
use crate::error::CommandError;
use crate::experiment::Experiment;
use crate::protocol::{Message, Response};
use crate::state::ServerState;
use crate::transport::connection::ConnectionHandle;

/// Where a request is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inline,
    Deferred,
}

/// A request waiting to run on a simulation thread.
pub struct DeferredCommand {
    state: Arc<ServerState>,
    connection: ConnectionHandle,
    message: Message,
}

impl DeferredCommand {
    pub fn new(state: Arc<ServerState>, connection: ConnectionHandle, message: Message) -> Self {
        Self { state, connection, message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Execute and answer on the issuing connection.
    pub fn run(self) {
        execute(&self.state, &self.connection, &self.message);
    }
}

impl fmt::Debug for DeferredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCommand")
            .field("connection", &self.connection.id())
            .field("type", &self.message.kind())
            .finish()
    }
}

/// The running experiment a request has to be serialized with, if any.
pub fn live_target(
    state: &ServerState,
    connection: &ConnectionHandle,
    message: &Message,
) -> Option<Arc<Experiment>> {
    message.exp_id()?;
    let experiment = state.resolve_experiment(connection, message).ok()?;
    let controller = &experiment.controller;
    (controller.is_alive() && !controller.is_paused()).then_some(experiment)
}

pub fn placement(state: &ServerState, connection: &ConnectionHandle, message: &Message) -> Placement {
    match live_target(state, connection, message) {
        Some(_) => Placement::Deferred,
        None => Placement::Inline,
    }
}

/// Route `message` to its handler, inline or on the simulation thread.
pub fn dispatch(state: &Arc<ServerState>, connection: &ConnectionHandle, message: Message) {
    match live_target(state, connection, &message) {
        Some(experiment) => {
            debug!(conn = %connection.id(), exp_id = %experiment.id, "deferring to simulation thread");
            let command = DeferredCommand::new(Arc::clone(state), connection.clone(), message);
            if let Err(command) = experiment.controller.post(command) {
                command.run();
            }
        }
        None => execute(state, connection, &message),
    }
}

/// Run the handler for `message` and send its response. Panics inside the
/// handler become `GamaServerError` responses.
pub fn execute(state: &Arc<ServerState>, connection: &ConnectionHandle, message: &Message) {
    let kind = message.kind().and_then(CommandKind::from_wire);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_handler(state, connection, message)));
    let response = match outcome {
        Ok(Ok(response)) => response.for_request(message),
        Ok(Err(error)) => Response::failure(error, message),
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            error!(conn = %connection.id(), command = ?message.kind(), "handler panicked: {reason}");
            Response::failure(CommandError::server(reason), message)
        }
    };

    if !connection.send(&response) {
        debug!(conn = %connection.id(), "connection closed before the response was sent");
    }
    if kind == Some(CommandKind::Exit) && response.is_success() {
        state.shutdown.cancel();
    }
}

fn run_handler(
    state: &Arc<ServerState>,
    connection: &ConnectionHandle,
    message: &Message,
) -> Result<Response, CommandError> {
    let Some(name) = message.kind() else {
        return Err(CommandError::malformed("The request has no 'type' field"));
    };
    let Some(kind) = CommandKind::from_wire(name) else {
        return Err(CommandError::server(format!("Invalid command type: {name}")));
    };
    debug!(conn = %connection.id(), command = kind.as_str(), "executing");
    let ctx = CommandContext { state, connection, message, kind };
    state.catalog.handler(kind).execute(&ctx)
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected failure".to_owned()
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
