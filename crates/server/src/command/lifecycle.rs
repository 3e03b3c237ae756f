// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands that create, describe, and tear down experiments.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{parameters, CommandContext, CommandHandler};
use crate::broadcast::{Gates, Push, ServerConfiguration};
use crate::engine::ast::{Expr, Model};
use crate::engine::parser::parse_expression;
use crate::engine::{Value as EngineValue, World};
use crate::error::CommandError;
use crate::experiment::{Experiment, ExperimentState, LoadingGuard, LoopController};
use crate::protocol::Response;
use crate::state::ServerState;

/// Compile the model file named by the `model` field, checking it first.
pub(crate) fn compile_model(ctx: &CommandContext<'_>, text: &str) -> Result<Arc<Model>, CommandError> {
    let path = Path::new(text);
    if !path.exists() {
        return Err(CommandError::unable(format!("'{text}' does not exist")));
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("gaml") {
        return Err(CommandError::unable(format!("'{text}' is not a gaml file")));
    }
    ctx.state.compiler.compile(path).map_err(|diagnostics| {
        let reasons: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
        CommandError::unable(format!("Impossible to compile '{text}' because of {}", reasons.join("; ")))
    })
}

/// Parse the optional `until` field.
pub(crate) fn stop_condition(ctx: &CommandContext<'_>) -> Result<Option<Expr>, CommandError> {
    let Some(text) = ctx.message.text("until").filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    parse_expression(&text).map(Some).map_err(|diagnostics| {
        let reasons: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
        CommandError::unable(format!("Unable to parse the stop condition '{text}': {}", reasons.join("; ")))
    })
}

/// A parameter name is a title of the experiment or a global variable.
fn known_parameter(model: &Model, experiment: &str, name: &str) -> bool {
    let titled = model
        .experiment(experiment)
        .is_some_and(|e| e.parameters.iter().any(|p| p.title == name || p.var == name));
    titled || model.global.attribute(name).is_some()
}

fn gates(ctx: &CommandContext<'_>) -> Result<Gates, CommandError> {
    Ok(Gates {
        console: ctx.message.flag("console", true)?,
        status: ctx.message.flag("status", true)?,
        dialog: ctx.message.flag("dialog", true)?,
        runtime: ctx.message.flag("runtime", true)?,
    })
}

pub struct Load;

impl CommandHandler for Load {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let nonblank = |key: &str| ctx.message.text(key).filter(|s| !s.trim().is_empty());
        let (Some(model_path), Some(experiment)) = (nonblank("model"), nonblank("experiment")) else {
            return Err(CommandError::malformed(
                "For 'load', mandatory parameters are: 'model' and 'experiment'",
            ));
        };
        let gates = gates(ctx)?;
        let parameters = parameters(ctx.message)?;
        let until = stop_condition(ctx)?;

        let guard = ctx
            .state
            .experiments
            .begin_loading()
            .ok_or_else(|| CommandError::unable("Unable to load: another one is loading"))?;

        let model = compile_model(ctx, &model_path)?;
        if model.experiment(&experiment).is_none() {
            return Err(CommandError::unable(format!(
                "'{experiment}' is not an experiment present in '{model_path}'"
            )));
        }
        if let Some((name, _)) =
            parameters.iter().find(|(name, _)| !known_parameter(&model, &experiment, name))
        {
            return Err(CommandError::unable(format!("Unknown parameter: {name}")));
        }

        let generation = ctx.state.experiments.generation();
        let exp_id = ctx.state.experiments.next_id();
        guard.assign(&exp_id);
        let messenger = &ctx.state.messenger;
        messenger.register(ServerConfiguration::new(&exp_id, ctx.connection.clone(), gates));
        messenger.send(&exp_id, Push::Status(ExperimentState::NotReady));

        let job = Launch {
            state: Arc::clone(ctx.state),
            exp_id: exp_id.clone(),
            name: experiment.clone(),
            model,
            parameters,
            until,
            generation,
        };
        let spawned = std::thread::Builder::new()
            .name(format!("load-{exp_id}"))
            .spawn(move || job.run(guard));
        if let Err(e) = spawned {
            ctx.state.messenger.remove(&exp_id);
            return Err(CommandError::server(format!("Unable to start the experiment: {e}")));
        }
        Ok(Response::success(experiment).with_exp_id(exp_id))
    }
}

/// Builds a loaded experiment off the connection thread.
struct Launch {
    state: Arc<ServerState>,
    exp_id: String,
    name: String,
    model: Arc<Model>,
    parameters: Vec<(String, EngineValue)>,
    until: Option<Expr>,
    generation: u64,
}

impl Launch {
    fn run(self, _guard: LoadingGuard) {
        let state = Arc::clone(&self.state);
        let exp_id = self.exp_id.clone();
        let generation = self.generation;
        match self.build() {
            Ok(experiment) => {
                if let Err(stale) = state.experiments.insert_current(Arc::clone(&experiment), generation) {
                    info!(exp_id = %exp_id, "load finished after stop, discarding");
                    stale.controller.close();
                    state.messenger.remove(&exp_id);
                    return;
                }
                experiment.flush(&state.messenger);
                state.messenger.send(&exp_id, Push::Status(ExperimentState::Paused));
                info!(exp_id = %exp_id, experiment = %experiment.name, model = %experiment.model.name, "experiment loaded");
            }
            Err(e) => {
                warn!(exp_id = %exp_id, "load failed: {e:#}");
                state.messenger.send(&exp_id, Push::RuntimeError(format!("{e:#}")));
                state.messenger.send(&exp_id, Push::Status(ExperimentState::None));
                state.messenger.remove(&exp_id);
            }
        }
    }

    fn build(self) -> anyhow::Result<Arc<Experiment>> {
        let config = &self.state.config;
        let world = World::new(
            Arc::clone(&self.model),
            &self.name,
            self.parameters,
            self.until,
            config.world_limits(),
        )?;
        let world = Arc::new(Mutex::new(world));
        let controller = LoopController::spawn(
            self.exp_id.clone(),
            Arc::clone(&world),
            Arc::clone(&self.state.messenger),
            config.cycle_delay(),
        )?;
        Ok(Arc::new(Experiment {
            id: self.exp_id,
            name: self.name,
            model: self.model,
            world,
            controller,
        }))
    }
}

pub struct Stop;

impl CommandHandler for Stop {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let closed = ctx.state.dispose_all();
        info!(conn = %ctx.connection.id(), closed, "stop");
        Ok(Response::success(""))
    }
}

pub struct Exit;

impl CommandHandler for Exit {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        info!(conn = %ctx.connection.id(), "exit requested");
        Ok(Response::success(""))
    }
}

pub struct Describe;

impl CommandHandler for Describe {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let path = ctx.required("model")?;
        let model = compile_model(ctx, &path)?;
        let flags = DescribeFlags {
            experiments: ctx.message.flag("experiments", true)?,
            species_names: ctx.message.flag("speciesNames", true)?,
            species_variables: ctx.message.flag("speciesVariables", true)?,
            species_actions: ctx.message.flag("speciesActions", true)?,
        };
        Ok(Response::success(describe(&model, flags)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescribeFlags {
    pub experiments: bool,
    pub species_names: bool,
    pub species_variables: bool,
    pub species_actions: bool,
}

/// Structured metadata of a compiled model. Species appear when any of the
/// species flags is set; variables and actions only with their own flag.
pub fn describe(model: &Model, flags: DescribeFlags) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("name".into(), json!(model.name));
    if flags.experiments {
        let experiments: Vec<Value> = model
            .experiments
            .iter()
            .map(|e| {
                let parameters: Vec<Value> = e
                    .parameters
                    .iter()
                    .map(|p| {
                        let ty = model.global.attribute(&p.var).map(|a| a.ty.as_str()).unwrap_or("unknown");
                        json!({ "name": p.title, "var": p.var, "type": ty })
                    })
                    .collect();
                json!({ "name": e.name, "parameters": parameters })
            })
            .collect();
        out.insert("experiments".into(), Value::Array(experiments));
    }
    if flags.species_names || flags.species_variables || flags.species_actions {
        let species: Vec<Value> = std::iter::once(&model.global)
            .chain(model.species.iter())
            .map(|s| {
                let mut entry = serde_json::Map::new();
                entry.insert("name".into(), json!(s.name));
                if flags.species_variables {
                    let variables: Vec<Value> = s
                        .attributes
                        .iter()
                        .map(|a| json!({ "name": a.name, "type": a.ty.as_str() }))
                        .collect();
                    entry.insert("variables".into(), Value::Array(variables));
                }
                if flags.species_actions {
                    let actions: Vec<Value> = s
                        .actions
                        .iter()
                        .map(|a| {
                            let args: Vec<Value> = a
                                .params
                                .iter()
                                .map(|(ty, name)| json!({ "name": name, "type": ty.as_str() }))
                                .collect();
                            json!({ "name": a.name, "args": args })
                        })
                        .collect();
                    entry.insert("actions".into(), Value::Array(actions));
                }
                Value::Object(entry)
            })
            .collect();
        out.insert("species".into(), Value::Array(species));
    }
    Value::Object(out)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
