// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcast::{Messenger, Push};
use crate::command::Catalog;
use crate::config::ServerConfig;
use crate::engine::{BuiltinCompiler, Compiler, World};
use crate::error::CommandError;
use crate::experiment::{Experiment, ExperimentState, Experiments, SharedWorld};
use crate::middleware::MiddlewareChain;
use crate::protocol::Message;
use crate::transport::connection::{ConnectionHandle, Connections};

/// Shared server state, passed to every connection task and handler.
pub struct ServerState {
    pub config: ServerConfig,
    pub connections: Connections,
    pub experiments: Arc<Experiments>,
    pub messenger: Arc<Messenger>,
    pub catalog: Arc<Catalog>,
    pub middleware: MiddlewareChain,
    pub compiler: Arc<dyn Compiler>,
    /// World of the empty platform model; `evaluate` without `exp_id` runs here.
    pub platform: SharedWorld,
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Self {
        let middleware = MiddlewareChain::from_config(&config);
        Self {
            config,
            connections: Connections::new(),
            experiments: Arc::new(Experiments::new()),
            messenger: Arc::new(Messenger::new()),
            catalog: Arc::new(Catalog::standard()),
            middleware,
            compiler: Arc::new(BuiltinCompiler),
            platform: Arc::new(Mutex::new(World::platform())),
            shutdown,
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = middleware;
        self
    }

    /// Find the live experiment `message` addresses.
    ///
    /// An experiment owned by another open connection is only reachable when
    /// the request names that connection in `socket_id`. Experiments whose
    /// owner went away are re-attached to the requesting connection.
    pub fn resolve_experiment(
        &self,
        connection: &ConnectionHandle,
        message: &Message,
    ) -> Result<Arc<Experiment>, CommandError> {
        let Some(exp_id) = message.exp_id() else {
            let kind = message.kind().unwrap_or("request");
            return Err(CommandError::malformed(format!(
                "For {kind}, mandatory parameter is: exp_id"
            )));
        };
        self.resolve_id(connection, message, &exp_id)
    }

    /// Like [`ServerState::resolve_experiment`] for an id chosen by the
    /// server rather than named in the request.
    pub fn resolve_id(
        &self,
        connection: &ConnectionHandle,
        message: &Message,
        exp_id: &str,
    ) -> Result<Arc<Experiment>, CommandError> {
        let missing = || CommandError::unable("Unable to find the experiment or simulation");
        let experiment = self.experiments.get(exp_id).ok_or_else(missing)?;
        if !experiment.controller.is_alive() {
            return Err(missing());
        }

        let owner = self.messenger.configuration(exp_id);
        match owner.as_ref().and_then(|config| config.live_connection()) {
            Some(owner) if owner.id() != connection.id() => {
                if message.socket_id() != Some(owner.id().to_string()) {
                    return Err(missing());
                }
            }
            Some(_) => {}
            None if owner.is_some() => {
                debug!(conn = %connection.id(), exp_id = %exp_id, "re-attaching experiment");
                self.messenger.reattach(exp_id, connection);
            }
            None => {}
        }
        Ok(experiment)
    }

    /// Close and forget one experiment.
    pub fn dispose(&self, exp_id: &str) {
        if let Some(experiment) = self.experiments.remove(exp_id) {
            experiment.controller.close();
            self.messenger.send(exp_id, Push::Status(ExperimentState::None));
            info!(exp_id, "experiment closed");
        }
        self.messenger.remove(exp_id);
    }

    /// Close every experiment, including one still loading. Returns how
    /// many registered experiments were closed.
    pub fn dispose_all(&self) -> usize {
        let experiments = self.experiments.drain();
        if let Some(exp_id) = self.experiments.loading_id() {
            self.messenger.send(&exp_id, Push::Status(ExperimentState::None));
            self.messenger.remove(&exp_id);
            info!(exp_id = %exp_id, "pending load cancelled");
        }
        for experiment in &experiments {
            experiment.controller.close();
            self.messenger.send(&experiment.id, Push::Status(ExperimentState::None));
            self.messenger.remove(&experiment.id);
        }
        if !experiments.is_empty() {
            info!(count = experiments.len(), "experiments closed");
        }
        experiments.len()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
