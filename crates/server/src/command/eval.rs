// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands that run GAML text: evaluate, validate, and ask.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use super::{CommandContext, CommandHandler};
use crate::engine::{AgentRef, EngineError, Value as EngineValue};
use crate::error::CommandError;
use crate::protocol::Response;

fn agent(ctx: &CommandContext<'_>) -> Result<AgentRef, CommandError> {
    let text = ctx.message.text("agent").unwrap_or_default();
    AgentRef::parse(&text)
        .ok_or_else(|| CommandError::unable(EngineError::UnknownAgent(text.trim().to_owned()).to_string()))
}

pub struct Evaluate;

impl CommandHandler for Evaluate {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let expr = ctx.required("expr")?;
        let escaped = ctx.escaped()?;

        if let Some(topic) = expr.trim().strip_prefix('?') {
            let topic = topic.trim();
            return match ctx.state.compiler.documentation(topic) {
                Some(doc) => Ok(Response::success_text(doc, escaped)),
                None => Err(CommandError::unable(format!("No documentation found for '{topic}'"))),
            };
        }

        let agent = agent(ctx)?;
        let (result, exp_id) = match ctx.message.exp_id() {
            Some(_) => {
                let experiment = ctx.experiment()?;
                let result = experiment.world.lock().scope("evaluate").evaluate_text(&expr, &agent);
                experiment.flush(&ctx.state.messenger);
                (result, Some(experiment.id.clone()))
            }
            None => {
                let mut world = ctx.state.platform.lock();
                let result = world.scope("evaluate").evaluate_text(&expr, &agent);
                let dropped = world.take_emissions();
                if !dropped.is_empty() {
                    trace!(count = dropped.len(), "platform output discarded");
                }
                (result, None)
            }
        };

        let text = match result {
            Ok(value) => value.to_string(),
            Err(e) => return Err(CommandError::unable(format!("> Error: {e}"))),
        };
        if text.is_empty() {
            return Err(CommandError::unable("> Error: the expression returned an empty result"));
        }
        let response = Response::success_text(text, escaped);
        Ok(match exp_id {
            Some(id) => response.with_exp_id(id),
            None => response,
        })
    }
}

/// Wrap client text into a model the compiler can check.
pub fn validation_source(text: &str) -> String {
    let trimmed = text.trim();
    let first = trimmed.split_whitespace().next().unwrap_or_default();
    match first {
        "model" => trimmed.to_owned(),
        "species" | "grid" => format!("model validation\n\n{trimmed}\n"),
        _ if trimmed.contains('\n') || trimmed.ends_with(';') || trimmed.ends_with('}') => {
            format!("model validation\n\nglobal {{\n    init {{\n{trimmed}\n    }}\n}}\n")
        }
        _ => format!(
            "model validation\n\nglobal {{\n    init {{\n        unknown result <- {trimmed};\n    }}\n}}\n"
        ),
    }
}

pub struct Validate;

impl CommandHandler for Validate {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let text = ctx.message.text("expr").unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(Response::success(""));
        }
        let syntax_only = ctx.message.flag("syntax", false)?;
        let escaped = ctx.escaped()?;

        let diagnostics = ctx.state.compiler.validate(&validation_source(&text), syntax_only);
        if diagnostics.is_empty() {
            return Ok(Response::success_text(text, escaped));
        }
        let encoded = serde_json::to_string(&diagnostics)
            .map_err(|e| CommandError::server(format!("Unable to encode the diagnostics: {e}")))?;
        Err(CommandError::unable(encoded))
    }
}

/// The `args` field: a JSON object, or a string holding one.
fn arguments(ctx: &CommandContext<'_>) -> Result<IndexMap<String, EngineValue>, CommandError> {
    let decoded;
    let object = match ctx.message.get("args") {
        None | Some(Value::Null) => return Ok(IndexMap::new()),
        Some(Value::String(text)) if text.trim().is_empty() => return Ok(IndexMap::new()),
        Some(Value::String(text)) => {
            decoded = serde_json::from_str::<Value>(text)
                .map_err(|e| CommandError::malformed(format!("'args' is not valid JSON: {e}")))?;
            &decoded
        }
        Some(other) => other,
    };
    let Value::Object(map) = object else {
        return Err(CommandError::malformed("'args' must be a JSON object"));
    };
    Ok(map.iter().map(|(name, value)| (name.clone(), EngineValue::from_json(value))).collect())
}

pub struct Ask;

impl CommandHandler for Ask {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let action = ctx.required("action")?;
        let args = arguments(ctx)?;
        let escaped = ctx.escaped()?;
        let experiment = ctx.experiment()?;
        let agent = agent(ctx)?;

        let result = {
            let mut world = experiment.world.lock();
            let mut scope = world.scope(format!("ask {action}"));
            let outcome = if !scope.world().has_agent(&agent) {
                Err(EngineError::UnknownAgent(agent.to_string()))
            } else if !scope.world().has_action(&agent, &action) {
                Err(EngineError::UnknownAction { action: action.clone(), agent: agent.to_string() })
            } else {
                scope.execute(&action, &agent, args)
            };
            outcome
        };
        experiment.flush(&ctx.state.messenger);

        result.map_err(|e| CommandError::unable(e.to_string()))?;
        Ok(Response::success_text(String::new(), escaped).with_exp_id(experiment.id.clone()))
    }
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;
