// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in GAML subset: lexer, parser, compiler, and the world interpreter
//! that experiments run on.
//!
//! The server only talks to this module through [`Compiler`] and the
//! [`World`] API, so a different modeling engine can be plugged in behind the
//! same seams.

pub mod ast;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod value;
pub mod world;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

pub use ast::Model;
pub use compiler::BuiltinCompiler;
pub use scope::ScopeGuard;
pub use value::{Value, ValueType};
pub use world::{AgentRef, Emission, Limits, StepOutcome, World};

/// A compiler message anchored to a position in the source text. Semantic
/// errors carry line 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self { line, column, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            return f.write_str(&self.message);
        }
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Errors raised while building or running a world.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Syntax(Vec<Diagnostic>),
    UnknownVariable(String),
    UnknownFunction(String),
    UnknownSpecies(String),
    UnknownAgent(String),
    UnknownAction { action: String, agent: String },
    UnknownParameter(String),
    MissingArgument { action: String, argument: String },
    Type(String),
    DivisionByZero,
    NoHistory,
    TooManyAgents { requested: usize, limit: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(diagnostics) => {
                let joined: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
                write!(f, "syntax error: {}", joined.join("; "))
            }
            Self::UnknownVariable(name) => write!(f, "Unknown variable: {name}"),
            Self::UnknownFunction(name) => write!(f, "Unknown operator: {name}"),
            Self::UnknownSpecies(name) => write!(f, "Unknown species: {name}"),
            Self::UnknownAgent(name) => write!(f, "Agent does not exist: {name}"),
            Self::UnknownAction { action, agent } => {
                write!(f, "Action {action} does not exist in agent {agent}")
            }
            Self::UnknownParameter(name) => write!(f, "Unknown parameter: {name}"),
            Self::MissingArgument { action, argument } => {
                write!(f, "Missing argument {argument} for action {action}")
            }
            Self::Type(msg) => f.write_str(msg),
            Self::DivisionByZero => f.write_str("Division by zero"),
            Self::NoHistory => f.write_str("No previous cycle to go back to"),
            Self::TooManyAgents { requested, limit } => {
                write!(f, "Unable to create {requested} agents: the world is limited to {limit}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<Vec<Diagnostic>> for EngineError {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self::Syntax(diagnostics)
    }
}

/// Turns model sources into runnable models.
pub trait Compiler: Send + Sync {
    /// Compile the model file at `path`.
    fn compile(&self, path: &Path) -> Result<Arc<Model>, Vec<Diagnostic>>;

    /// Check a model source text. An empty result means the text is valid.
    fn validate(&self, source: &str, syntax_only: bool) -> Vec<Diagnostic>;

    /// Documentation for a keyword, operator, or statement.
    fn documentation(&self, _topic: &str) -> Option<String> {
        None
    }
}
