// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution scopes for client-driven evaluation.
//!
//! A [`ScopeGuard`] borrows the world for the duration of one command.
//! Temporary actions installed through it are removed and the scope is
//! released when the guard drops, on every exit path.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::ast::{ActionDecl, Expr, Stmt};
use super::parser::{parse_expression, parse_statements};
use super::value::Value;
use super::world::{AgentRef, Frame, World};
use super::EngineError;

pub struct ScopeGuard<'w> {
    world: &'w mut World,
    label: String,
    temporary: Vec<(String, String)>,
}

impl World {
    /// Open a scope labelled for tracing.
    pub fn scope(&mut self, label: impl Into<String>) -> ScopeGuard<'_> {
        let label = label.into();
        self.open_scopes += 1;
        trace!(scope = %label, "scope opened");
        ScopeGuard { world: self, label, temporary: vec![] }
    }
}

impl ScopeGuard<'_> {
    pub fn world(&self) -> &World {
        self.world
    }

    pub fn evaluate(&mut self, expr: &Expr, agent: &AgentRef) -> Result<Value, EngineError> {
        if !self.world.has_agent(agent) {
            return Err(EngineError::UnknownAgent(agent.to_string()));
        }
        self.world.eval(expr, &Frame::new(agent.clone()))
    }

    pub fn execute(
        &mut self,
        action: &str,
        agent: &AgentRef,
        args: IndexMap<String, Value>,
    ) -> Result<Value, EngineError> {
        self.world.call_action(agent, action, args)
    }

    /// Install `body` as an action of `agent`'s species for the lifetime of
    /// this scope and return its generated name.
    pub fn add_temporary_action(
        &mut self,
        agent: &AgentRef,
        body: Vec<Stmt>,
    ) -> Result<String, EngineError> {
        let species = self
            .world
            .species_of(agent)
            .map(str::to_owned)
            .ok_or_else(|| EngineError::UnknownAgent(agent.to_string()))?;
        self.world.temp_seq += 1;
        let name = format!("__temporary_{}", self.world.temp_seq);
        let decl = ActionDecl { name: name.clone(), params: vec![], body };
        self.world.actions.entry(species.clone()).or_default().insert(name.clone(), Arc::new(decl));
        self.temporary.push((species, name.clone()));
        Ok(name)
    }

    /// Evaluate client text: a single expression yields its value, anything
    /// else runs as a statement block on `agent`.
    pub fn evaluate_text(&mut self, text: &str, agent: &AgentRef) -> Result<Value, EngineError> {
        match parse_expression(text) {
            Ok(expr) => self.evaluate(&expr, agent),
            Err(_) => {
                let body = parse_statements(text)?;
                let name = self.add_temporary_action(agent, body)?;
                self.execute(&name, agent, IndexMap::new())
            }
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        for (species, name) in self.temporary.drain(..) {
            if let Some(table) = self.world.actions.get_mut(&species) {
                table.shift_remove(&name);
            }
        }
        self.world.open_scopes = self.world.open_scopes.saturating_sub(1);
        trace!(scope = %self.label, "scope released");
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
