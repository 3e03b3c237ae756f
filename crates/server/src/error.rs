// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope `type` values of every message the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    ConnectionSuccessful,
    CommandExecutedSuccessfully,
    MalformedRequest,
    UnableToExecuteRequest,
    GamaServerError,
    RuntimeError,
    SimulationStatus,
    SimulationOutput,
    SimulationDebug,
    SimulationDialog,
    SimulationStatusInform,
    SimulationStatusError,
    SimulationEnded,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionSuccessful => "ConnectionSuccessful",
            Self::CommandExecutedSuccessfully => "CommandExecutedSuccessfully",
            Self::MalformedRequest => "MalformedRequest",
            Self::UnableToExecuteRequest => "UnableToExecuteRequest",
            Self::GamaServerError => "GamaServerError",
            Self::RuntimeError => "RuntimeError",
            Self::SimulationStatus => "SimulationStatus",
            Self::SimulationOutput => "SimulationOutput",
            Self::SimulationDebug => "SimulationDebug",
            Self::SimulationDialog => "SimulationDialog",
            Self::SimulationStatusInform => "SimulationStatusInform",
            Self::SimulationStatusError => "SimulationStatusError",
            Self::SimulationEnded => "SimulationEnded",
        }
    }

    /// True for the three failure outcomes a command can produce.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::MalformedRequest | Self::UnableToExecuteRequest | Self::GamaServerError)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed command: the envelope type to answer with and its content.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandError {
    pub kind: MessageType,
    pub content: serde_json::Value,
}

impl CommandError {
    pub fn new(kind: MessageType, content: impl Into<serde_json::Value>) -> Self {
        Self { kind, content: content.into() }
    }

    /// The request is missing or has invalid fields.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(MessageType::MalformedRequest, message.into())
    }

    /// The request is well formed but cannot be carried out.
    pub fn unable(message: impl Into<String>) -> Self {
        Self::new(MessageType::UnableToExecuteRequest, message.into())
    }

    /// The server failed while executing the request.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(MessageType::GamaServerError, message.into())
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            serde_json::Value::String(s) => write!(f, "{}: {s}", self.kind),
            other => write!(f, "{}: {other}", self.kind),
        }
    }
}

impl std::error::Error for CommandError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
