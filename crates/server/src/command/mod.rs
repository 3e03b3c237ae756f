// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The command catalog: every operation a client can request, one handler
//! per [`CommandKind`].

pub mod control;
pub mod eval;
pub mod files;
pub mod lifecycle;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::engine::Value as EngineValue;
use crate::error::CommandError;
use crate::experiment::Experiment;
use crate::protocol::{Message, Response};
use crate::state::ServerState;
use crate::transport::connection::ConnectionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Load,
    Play,
    Pause,
    Step,
    Back,
    Stop,
    Reload,
    Evaluate,
    Validate,
    Ask,
    Download,
    Upload,
    Describe,
    Exit,
}

impl CommandKind {
    pub const ALL: [CommandKind; 14] = [
        Self::Load,
        Self::Play,
        Self::Pause,
        Self::Step,
        Self::Back,
        Self::Stop,
        Self::Reload,
        Self::Evaluate,
        Self::Validate,
        Self::Ask,
        Self::Download,
        Self::Upload,
        Self::Describe,
        Self::Exit,
    ];

    /// Parse the `type` field of a request, aliases included.
    pub fn from_wire(name: &str) -> Option<Self> {
        let kind = match name {
            "load" => Self::Load,
            "play" => Self::Play,
            "pause" => Self::Pause,
            "step" => Self::Step,
            "back" | "stepBack" => Self::Back,
            "stop" => Self::Stop,
            "reload" => Self::Reload,
            "evaluate" | "expression" => Self::Evaluate,
            "validate" => Self::Validate,
            "ask" => Self::Ask,
            "download" => Self::Download,
            "upload" => Self::Upload,
            "describe" => Self::Describe,
            "exit" => Self::Exit,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Step => "step",
            Self::Back => "back",
            Self::Stop => "stop",
            Self::Reload => "reload",
            Self::Evaluate => "evaluate",
            Self::Validate => "validate",
            Self::Ask => "ask",
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Describe => "describe",
            Self::Exit => "exit",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler may touch while answering one request.
pub struct CommandContext<'a> {
    pub state: &'a Arc<ServerState>,
    pub connection: &'a ConnectionHandle,
    pub message: &'a Message,
    pub kind: CommandKind,
}

impl CommandContext<'_> {
    /// The experiment named by `exp_id`, checked for ownership.
    pub fn experiment(&self) -> Result<Arc<Experiment>, CommandError> {
        self.state.resolve_experiment(self.connection, self.message)
    }

    /// A mandatory string field.
    pub fn required(&self, key: &str) -> Result<String, CommandError> {
        self.message.text(key).filter(|s| !s.trim().is_empty()).ok_or_else(|| {
            CommandError::malformed(format!("For '{}', mandatory parameter is: '{key}'", self.kind))
        })
    }

    /// A mandatory path field.
    pub fn path(&self, key: &str) -> Result<PathBuf, CommandError> {
        self.required(key).map(PathBuf::from)
    }

    pub fn escaped(&self) -> Result<bool, CommandError> {
        self.message.flag("escaped", false)
    }
}

pub trait CommandHandler: Send + Sync {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError>;
}

/// Immutable table from command kind to handler, built once per server.
pub struct Catalog {
    handlers: Vec<(CommandKind, Box<dyn CommandHandler>)>,
}

impl Catalog {
    pub fn standard() -> Self {
        let handlers = CommandKind::ALL.iter().map(|kind| (*kind, standard_handler(*kind))).collect();
        Self { handlers }
    }

    /// Replace the handler of `kind`.
    pub fn with_handler(mut self, kind: CommandKind, handler: impl CommandHandler + 'static) -> Self {
        if let Some(entry) = self.handlers.iter_mut().find(|e| e.0 == kind) {
            entry.1 = Box::new(handler);
        }
        self
    }

    pub fn handler(&self, kind: CommandKind) -> &dyn CommandHandler {
        match self.handlers.iter().find(|(k, _)| *k == kind) {
            Some((_, handler)) => handler.as_ref(),
            None => &Unavailable,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn standard_handler(kind: CommandKind) -> Box<dyn CommandHandler> {
    match kind {
        CommandKind::Load => Box::new(lifecycle::Load),
        CommandKind::Play => Box::new(control::Play),
        CommandKind::Pause => Box::new(control::Pause),
        CommandKind::Step => Box::new(control::Step),
        CommandKind::Back => Box::new(control::Back),
        CommandKind::Stop => Box::new(lifecycle::Stop),
        CommandKind::Reload => Box::new(control::Reload),
        CommandKind::Evaluate => Box::new(eval::Evaluate),
        CommandKind::Validate => Box::new(eval::Validate),
        CommandKind::Ask => Box::new(eval::Ask),
        CommandKind::Download => Box::new(files::Download),
        CommandKind::Upload => Box::new(files::Upload),
        CommandKind::Describe => Box::new(lifecycle::Describe),
        CommandKind::Exit => Box::new(lifecycle::Exit),
    }
}

struct Unavailable;

impl CommandHandler for Unavailable {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        Err(CommandError::server(format!("Invalid command type: {}", ctx.kind)))
    }
}

/// Parse a `parameters` array of `{name, value}` objects.
pub fn parameters(message: &Message) -> Result<Vec<(String, EngineValue)>, CommandError> {
    let Some(raw) = message.get("parameters").filter(|v| !v.is_null()) else {
        return Ok(vec![]);
    };
    let Value::Array(entries) = raw else {
        return Err(CommandError::malformed("'parameters' must be a list of {name, value} objects"));
    };
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let name = entry.get("name").and_then(Value::as_str).ok_or_else(|| {
                CommandError::malformed(format!(
                    "Parameter number {i} is missing its `name` field. Parameter received: {entry}"
                ))
            })?;
            let value = entry.get("value").ok_or_else(|| {
                CommandError::malformed(format!(
                    "Parameter number {i} is missing its `value` field. Parameter received: {entry}"
                ))
            })?;
            Ok((name.to_owned(), EngineValue::from_json(value)))
        })
        .collect()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
