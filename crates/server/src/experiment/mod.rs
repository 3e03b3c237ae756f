// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loaded experiments and the controllers that drive them.

pub mod controller;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::broadcast::Messenger;
use crate::engine::ast::Expr;
use crate::engine::{EngineError, Model, Value, World};
use crate::gate::DeferredCommand;

pub use controller::LoopController;
pub use registry::{Experiments, LoadingGuard};

pub type SharedWorld = Arc<Mutex<World>>;

/// Lifecycle states reported in `SimulationStatus` pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    None,
    NotReady,
    Running,
    Paused,
}

impl ExperimentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::NotReady => "NOTREADY",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reload changes before reinitializing the world. Nothing is
/// applied unless the controller accepts the reload.
#[derive(Debug, Default)]
pub struct ReloadSettings {
    pub parameters: Vec<(String, Value)>,
    /// `Some` replaces the stop condition; `None` keeps the current one.
    pub until: Option<Option<Expr>>,
}

impl ReloadSettings {
    pub fn apply(self, world: &mut World) -> Result<(), EngineError> {
        world.set_parameters(self.parameters)?;
        if let Some(until) = self.until {
            world.set_stop_condition(until);
        }
        Ok(())
    }
}

/// Drives the simulation loop of one experiment.
///
/// `sync` directives take effect before the call returns; the others are
/// queued for the simulation thread. Every `process_*` call returns `false`
/// when a directive is already pending ("controller full") or the
/// controller is closed.
pub trait ExperimentController: Send + Sync {
    fn process_start(&self, sync: bool) -> bool;
    fn process_pause(&self, sync: bool) -> bool;
    fn process_step(&self, sync: bool) -> Result<bool, EngineError>;
    fn process_back(&self, sync: bool) -> Result<bool, EngineError>;
    fn process_reload(&self, sync: bool, settings: ReloadSettings) -> Result<bool, EngineError>;

    fn is_paused(&self) -> bool;
    fn is_alive(&self) -> bool;

    /// Run `command` on the simulation thread between two cycles. Gives the
    /// command back when the thread cannot take it.
    fn post(&self, command: DeferredCommand) -> Result<(), DeferredCommand>;

    /// Stop the simulation thread. Pending directives are dropped.
    fn close(&self);
}

pub struct Experiment {
    pub id: String,
    pub name: String,
    pub model: Arc<Model>,
    pub world: SharedWorld,
    pub controller: Arc<dyn ExperimentController>,
}

impl Experiment {
    pub fn state(&self) -> ExperimentState {
        if !self.controller.is_alive() {
            ExperimentState::None
        } else if self.controller.is_paused() {
            ExperimentState::Paused
        } else {
            ExperimentState::Running
        }
    }

    /// Send text the world produced outside of the simulation loop.
    pub fn flush(&self, messenger: &Messenger) {
        let emissions = self.world.lock().take_emissions();
        messenger.flush(&self.id, emissions);
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model", &self.model.name)
            .field("state", &self.state())
            .finish()
    }
}
