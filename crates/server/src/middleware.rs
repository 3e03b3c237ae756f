// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-dispatch middleware: runs on every decoded request before the
//! synchronization gate and may rewrite or veto it.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::command::CommandKind;
use crate::config::ServerConfig;
use crate::protocol::Message;

pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect or rewrite `message`. Returning `false` drops it silently.
    fn process(&self, message: &mut Message) -> bool;
}

/// Middlewares in registration order. The first veto stops the chain.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain a server starts with: request logging, then the configured
    /// command deny list.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut chain = Self::new().with(RequestLog);
        if !config.deny_commands.is_empty() {
            chain = chain.with(DenyCommands::new(&config.deny_commands));
        }
        chain
    }

    pub fn with(mut self, stage: impl Middleware + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns `false` when some stage vetoed the message.
    pub fn process(&self, message: &mut Message) -> bool {
        for stage in &self.stages {
            if !stage.process(message) {
                debug!(middleware = stage.name(), command = ?message.kind(), "request vetoed");
                return false;
            }
        }
        true
    }
}

/// Logs every request that reaches it.
pub struct RequestLog;

impl Middleware for RequestLog {
    fn name(&self) -> &str {
        "request-log"
    }

    fn process(&self, message: &mut Message) -> bool {
        debug!(
            command = message.kind().unwrap_or("<none>"),
            exp_id = message.exp_id().as_deref().unwrap_or("-"),
            socket_id = message.socket_id().as_deref().unwrap_or("-"),
            "request"
        );
        true
    }
}

/// Drops requests for the listed commands. Aliases are matched through the
/// command they stand for.
pub struct DenyCommands {
    denied: HashSet<CommandKind>,
}

impl DenyCommands {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let denied = names.iter().filter_map(|name| CommandKind::from_wire(name.as_ref())).collect();
        Self { denied }
    }
}

impl Middleware for DenyCommands {
    fn name(&self) -> &str {
        "deny-commands"
    }

    fn process(&self, message: &mut Message) -> bool {
        match message.kind().and_then(CommandKind::from_wire) {
            Some(kind) => !self.denied.contains(&kind),
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "middleware_tests.rs"]
mod tests;
