// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime values of the built-in GAML interpreter.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EngineError;

/// Declared type of an attribute, parameter, or local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Float,
    String,
    Bool,
    List,
    Unknown,
}

impl ValueType {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "string" => Some(Self::String),
            "bool" => Some(Self::Bool),
            "list" => Some(Self::List),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Unknown => "unknown",
        }
    }

    /// Value an attribute of this type holds before its initializer runs.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::Str(String::new()),
            Self::Bool => Value::Bool(false),
            Self::List => Value::List(vec![]),
            Self::Unknown => Value::Nil,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }

    pub fn truthy(&self) -> Result<bool, EngineError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(EngineError::Type(format!(
                "expected a bool but got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert to the declared type, as GAML does on assignment.
    pub fn coerce(self, ty: ValueType) -> Result<Value, EngineError> {
        let mismatch = |v: &Value| {
            EngineError::Type(format!("cannot convert {} to {}", v.type_name(), ty))
        };
        match (ty, self) {
            (ValueType::Unknown, v) => Ok(v),
            (ValueType::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (ValueType::Int, Value::Float(f)) => Ok(Value::Int(f.trunc() as i64)),
            (ValueType::Int, Value::Str(s)) => {
                s.trim().parse().map(Value::Int).map_err(|_| mismatch(&Value::Str(s)))
            }
            (ValueType::Int, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
            (ValueType::Int, Value::Nil) => Ok(Value::Int(0)),
            (ValueType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (ValueType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ValueType::Float, Value::Str(s)) => {
                s.trim().parse().map(Value::Float).map_err(|_| mismatch(&Value::Str(s)))
            }
            (ValueType::Float, Value::Nil) => Ok(Value::Float(0.0)),
            (ValueType::String, v) => Ok(Value::Str(v.to_string())),
            (ValueType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ValueType::Bool, Value::Str(s)) if s == "true" || s == "false" => {
                Ok(Value::Bool(s == "true"))
            }
            (ValueType::Bool, Value::Nil) => Ok(Value::Bool(false)),
            (ValueType::List, Value::List(items)) => Ok(Value::List(items)),
            (ValueType::List, Value::Nil) => Ok(Value::List(vec![])),
            (_, v) => Err(mismatch(&v)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Nil => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Self::Str(value.to_string()),
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "'{s}'"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    item.fmt_nested(f)?;
                }
                f.write_str("]")
            }
        }
    }
}
