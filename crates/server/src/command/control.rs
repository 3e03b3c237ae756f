// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control directives: play, pause, step, back, and reload.

use std::sync::Arc;

use tracing::debug;

use super::lifecycle::stop_condition;
use super::{parameters, CommandContext, CommandHandler};
use crate::engine::EngineError;
use crate::error::CommandError;
use crate::experiment::{Experiment, ExperimentController, ReloadSettings};
use crate::protocol::Response;

fn full() -> CommandError {
    CommandError::unable("Controller is full")
}

fn engine_failure(error: EngineError) -> CommandError {
    CommandError::unable(error.to_string())
}

pub struct Play;

impl CommandHandler for Play {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let experiment = match ctx.message.exp_id() {
            Some(_) => ctx.experiment()?,
            None => {
                let front = ctx
                    .state
                    .experiments
                    .frontmost()
                    .ok_or_else(|| CommandError::unable("Unable to find the experiment or simulation"))?;
                ctx.state.resolve_id(ctx.connection, ctx.message, &front.id)?
            }
        };
        if !experiment.controller.process_start(false) {
            return Err(full());
        }
        Ok(Response::success("").with_exp_id(experiment.id.clone()))
    }
}

pub struct Pause;

impl CommandHandler for Pause {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let experiment = ctx.experiment()?;
        if !experiment.controller.process_pause(true) {
            return Err(full());
        }
        Ok(Response::success("").with_exp_id(experiment.id.clone()))
    }
}

/// Run `op` `count` times, stopping at the first busy or failing call.
/// Steps already applied stay applied.
fn repeat(
    experiment: &Experiment,
    count: u64,
    op: impl Fn(&dyn ExperimentController) -> Result<bool, EngineError>,
) -> Result<(), CommandError> {
    for done in 0..count {
        match op(experiment.controller.as_ref()) {
            Ok(true) => {}
            Ok(false) => {
                debug!(exp_id = %experiment.id, done, count, "controller busy");
                return Err(full());
            }
            Err(e) => {
                debug!(exp_id = %experiment.id, done, count, "directive failed: {e}");
                return Err(engine_failure(e));
            }
        }
    }
    Ok(())
}

fn step_count(ctx: &CommandContext<'_>) -> Result<u64, CommandError> {
    match ctx.message.integer("nb_step")? {
        None => Ok(1),
        Some(n) if n > 0 => Ok(n.unsigned_abs()),
        Some(_) => Err(CommandError::malformed("'nb_step' must be a positive integer")),
    }
}

pub struct Step;

impl CommandHandler for Step {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let experiment = ctx.experiment()?;
        let count = step_count(ctx)?;
        let sync = ctx.message.flag("sync", false)?;
        repeat(&experiment, count, |controller| controller.process_step(sync))?;
        Ok(Response::success("").with_exp_id(experiment.id.clone()))
    }
}

pub struct Back;

impl CommandHandler for Back {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let experiment = ctx.experiment()?;
        let count = step_count(ctx)?;
        let sync = ctx.message.flag("sync", false)?;
        repeat(&experiment, count, |controller| controller.process_back(sync))?;
        Ok(Response::success("").with_exp_id(experiment.id.clone()))
    }
}

pub struct Reload;

impl CommandHandler for Reload {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let experiment: Arc<Experiment> = ctx.experiment()?;
        let parameters = parameters(ctx.message)?;
        let until = stop_condition(ctx)?;
        {
            let world = experiment.world.lock();
            if let Some((name, _)) = parameters.iter().find(|(name, _)| world.resolve_parameter(name).is_none()) {
                return Err(CommandError::unable(format!("Unknown parameter: {name}")));
            }
        }
        let settings = ReloadSettings {
            parameters,
            until: ctx.message.contains("until").then_some(until),
        };
        match experiment.controller.process_reload(true, settings) {
            Ok(true) => Ok(Response::success("").with_exp_id(experiment.id.clone())),
            Ok(false) => Err(full()),
            Err(e) => Err(engine_failure(e)),
        }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
