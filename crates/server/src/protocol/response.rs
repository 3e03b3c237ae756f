// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;
use serde_json::Value;

use super::message::Message;
use crate::error::{CommandError, MessageType};

/// The envelope of every server-to-client message.
///
/// Command responses carry the echoed request in `command`; pushes carry
/// the experiment they originate from in `exp_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_id: Option<String>,
}

impl Response {
    pub fn new(kind: MessageType, content: impl Into<Value>) -> Self {
        Self { kind, content: content.into(), command: None, exp_id: None }
    }

    pub fn success(content: impl Into<Value>) -> Self {
        Self::new(MessageType::CommandExecutedSuccessfully, content)
    }

    /// Success whose content is either the text itself or, when the client
    /// asked for `escaped`, the JSON the text encodes.
    pub fn success_text(text: String, escaped: bool) -> Self {
        Self::success(escape(text, escaped))
    }

    pub fn connected(socket_id: impl Into<String>) -> Self {
        Self::new(MessageType::ConnectionSuccessful, socket_id.into())
    }

    pub fn push(kind: MessageType, exp_id: impl Into<String>, content: impl Into<Value>) -> Self {
        Self { exp_id: Some(exp_id.into()), ..Self::new(kind, content) }
    }

    pub fn failure(error: CommandError, request: &Message) -> Self {
        Self::new(error.kind, error.content).for_request(request)
    }

    /// Attach the echo of `request`.
    pub fn for_request(mut self, request: &Message) -> Self {
        self.command = Some(request.echo());
        self
    }

    pub fn with_exp_id(mut self, exp_id: impl Into<String>) -> Self {
        self.exp_id = Some(exp_id.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == MessageType::CommandExecutedSuccessfully
    }
}

/// Content for text results: escaped results that hold JSON are embedded as
/// JSON; everything else stays a string.
pub fn escape(text: String, escaped: bool) -> Value {
    if escaped {
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            return value;
        }
    }
    Value::String(text)
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
