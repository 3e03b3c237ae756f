// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text frame decoding. Every request is a JSON document; a document that is
//! not an object is wrapped as `{"contents": <value>}`.

use serde::Serialize;
use serde_json::{Map, Value};

use super::message::Message;
use crate::error::CommandError;

pub fn decode(raw: &str) -> Result<Message, CommandError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        CommandError::malformed(format!("Unable to parse the request as JSON: {e}"))
    })?;
    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            let mut fields = Map::new();
            fields.insert("contents".to_owned(), other);
            fields
        }
    };
    Ok(Message::new(fields, raw))
}

/// Serialize an outbound envelope. Serialization of our own types only fails
/// on non-string map keys, which none of them have.
pub fn encode<T: Serialize>(message: &T) -> String {
    serde_json::to_string(message).unwrap_or_else(|e| {
        tracing::error!("failed to encode message: {e}");
        String::from("{}")
    })
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
