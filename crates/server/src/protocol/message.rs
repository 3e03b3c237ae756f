// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::{Map, Value};

use crate::error::CommandError;

/// A decoded client request: the ordered JSON fields plus the raw text.
///
/// Fields the server adds on receipt are tracked so that the echo sent back
/// with the response only carries what the client wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    fields: Map<String, Value>,
    injected: Vec<&'static str>,
    raw: String,
}

impl Message {
    pub fn new(fields: Map<String, Value>, raw: impl Into<String>) -> Self {
        Self { fields, injected: vec![], raw: raw.into() }
    }

    /// The `type` field, when it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(|v| !v.is_null())
    }

    /// A field as text. Numbers and booleans are rendered; null is absent.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// A boolean field, also accepting `"true"`/`"false"` strings.
    pub fn flag(&self, key: &str, default: bool) -> Result<bool, CommandError> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
            Some(_) => Err(CommandError::malformed(format!("'{key}' must be a boolean"))),
        }
    }

    /// An integer field, also accepting numeric strings.
    pub fn integer(&self, key: &str) -> Result<Option<i64>, CommandError> {
        let invalid = || CommandError::malformed(format!("'{key}' must be an integer"));
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// The experiment this request addresses, if any.
    pub fn exp_id(&self) -> Option<String> {
        self.text("exp_id").map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
    }

    pub fn socket_id(&self) -> Option<String> {
        self.text("socket_id").filter(|s| !s.is_empty())
    }

    /// Add a server-side field unless the client already set it.
    pub fn inject(&mut self, key: &'static str, value: impl Into<Value>) {
        if !self.fields.contains_key(key) {
            self.fields.insert(key.to_owned(), value.into());
            self.injected.push(key);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// The request as the client sent it, for echoing in responses.
    pub fn echo(&self) -> Value {
        let fields = self
            .fields
            .iter()
            .filter(|(key, _)| !self.injected.iter().any(|k| *k == key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(fields)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
