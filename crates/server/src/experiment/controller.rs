// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The built-in controller: one OS thread per experiment.
//!
//! The thread owns the run loop. While running it alternates between
//! draining its event channel and stepping the world; while paused it blocks
//! on the channel. Control directives share a single slot: a directive is
//! rejected while another one is pending, which is what clients see as
//! "Controller is full".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ExperimentController, ExperimentState, ReloadSettings, SharedWorld};
use crate::broadcast::{Messenger, Push};
use crate::engine::{EngineError, StepOutcome};
use crate::gate::DeferredCommand;

#[derive(Debug)]
enum Directive {
    Start,
    Pause,
    Step,
    Back,
    Reload(ReloadSettings),
}

enum LoopEvent {
    Directive(Directive),
    Task(DeferredCommand),
    Wake,
    Close,
}

pub struct LoopController {
    exp_id: String,
    world: SharedWorld,
    messenger: Arc<Messenger>,
    cycle_delay: Duration,
    paused: AtomicBool,
    alive: AtomicBool,
    pending: AtomicBool,
    events: mpsc::UnboundedSender<LoopEvent>,
    cancel: CancellationToken,
}

impl LoopController {
    /// Start the simulation thread of `exp_id`, initially paused.
    pub fn spawn(
        exp_id: impl Into<String>,
        world: SharedWorld,
        messenger: Arc<Messenger>,
        cycle_delay: Duration,
    ) -> std::io::Result<Arc<Self>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Arc::new(Self {
            exp_id: exp_id.into(),
            world,
            messenger,
            cycle_delay,
            paused: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            pending: AtomicBool::new(false),
            events: tx,
            cancel: CancellationToken::new(),
        });
        let runner = Arc::clone(&controller);
        std::thread::Builder::new()
            .name(format!("experiment-{}", controller.exp_id))
            .spawn(move || runner.run(rx))?;
        Ok(controller)
    }

    fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<LoopEvent>) {
        debug!(exp_id = %self.exp_id, "simulation thread started");
        while !self.cancel.is_cancelled() {
            let event = if self.is_paused() {
                match events.blocking_recv() {
                    Some(event) => Some(event),
                    None => break,
                }
            } else {
                match events.try_recv() {
                    Ok(event) => Some(event),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            };
            match event {
                Some(LoopEvent::Close) => break,
                Some(LoopEvent::Wake) => {}
                Some(LoopEvent::Directive(directive)) => self.apply(directive),
                Some(LoopEvent::Task(command)) => command.run(),
                None => self.run_cycle(),
            }
        }

        self.alive.store(false, Ordering::Release);
        self.paused.store(true, Ordering::Release);
        // Requests that were queued behind the close still get an answer.
        events.close();
        while let Ok(event) = events.try_recv() {
            if let LoopEvent::Task(command) = event {
                command.run();
            }
        }
        debug!(exp_id = %self.exp_id, "simulation thread stopped");
    }

    fn run_cycle(&self) {
        let started = Instant::now();
        let result = self.step_world();
        match result {
            Ok(outcome) if outcome.ended => {
                self.set_paused(true);
                self.messenger.send(&self.exp_id, Push::Ended { cycle: outcome.cycle });
            }
            Ok(_) => {}
            Err(e) => self.runtime_error(e),
        }
        if let Some(rest) = self.cycle_delay.checked_sub(started.elapsed()) {
            if !rest.is_zero() {
                std::thread::sleep(rest);
            }
        }
    }

    fn apply(&self, directive: Directive) {
        let result = match directive {
            Directive::Start => {
                self.set_paused(false);
                Ok(())
            }
            Directive::Pause => {
                self.set_paused(true);
                Ok(())
            }
            Directive::Step => {
                self.set_paused(true);
                self.step_once()
            }
            Directive::Back => {
                self.set_paused(true);
                self.back_once()
            }
            Directive::Reload(settings) => {
                self.set_paused(true);
                self.reload_now(settings)
            }
        };
        self.release();
        if let Err(e) = result {
            self.runtime_error(e);
        }
    }

    // -- World operations ----------------------------------------------------

    fn step_world(&self) -> Result<StepOutcome, EngineError> {
        let (result, emissions) = {
            let mut world = self.world.lock();
            let result = world.step();
            (result, world.take_emissions())
        };
        self.messenger.flush(&self.exp_id, emissions);
        result
    }

    fn step_once(&self) -> Result<(), EngineError> {
        let outcome = self.step_world()?;
        self.messenger.send(&self.exp_id, Push::StatusInform(format!("Cycle {}", outcome.cycle)));
        if outcome.ended {
            self.messenger.send(&self.exp_id, Push::Ended { cycle: outcome.cycle });
        }
        Ok(())
    }

    fn back_once(&self) -> Result<(), EngineError> {
        let cycle = self.world.lock().back()?;
        self.messenger.send(&self.exp_id, Push::StatusInform(format!("Cycle {cycle}")));
        Ok(())
    }

    fn reload_now(&self, settings: ReloadSettings) -> Result<(), EngineError> {
        let (result, emissions) = {
            let mut world = self.world.lock();
            let result = settings.apply(&mut world).and_then(|()| world.reload());
            (result, world.take_emissions())
        };
        self.messenger.flush(&self.exp_id, emissions);
        result?;
        self.messenger.send(&self.exp_id, Push::StatusInform("Experiment reloaded".into()));
        Ok(())
    }

    fn runtime_error(&self, error: EngineError) {
        warn!(exp_id = %self.exp_id, "runtime error: {error}");
        self.set_paused(true);
        self.messenger.send(&self.exp_id, Push::RuntimeError(error.to_string()));
    }

    // -- Directive slot ------------------------------------------------------

    fn set_paused(&self, paused: bool) {
        let was = self.paused.swap(paused, Ordering::AcqRel);
        if was != paused {
            let state = if paused { ExperimentState::Paused } else { ExperimentState::Running };
            self.messenger.send(&self.exp_id, Push::Status(state));
        }
    }

    fn claim(&self) -> bool {
        self.is_alive()
            && self.pending.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    fn release(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Queue `directive` for the simulation thread.
    fn offer(&self, directive: Directive) -> bool {
        if !self.claim() {
            return false;
        }
        if self.events.send(LoopEvent::Directive(directive)).is_err() {
            self.release();
            return false;
        }
        true
    }

    /// Run `op` now while holding the slot.
    fn now<T>(&self, op: impl FnOnce() -> Result<T, EngineError>) -> Result<bool, EngineError> {
        if !self.claim() {
            return Ok(false);
        }
        let result = op();
        self.release();
        result.map(|_| true)
    }
}

impl ExperimentController for LoopController {
    fn process_start(&self, sync: bool) -> bool {
        if !sync {
            return self.offer(Directive::Start);
        }
        self.now(|| {
            self.set_paused(false);
            let _ = self.events.send(LoopEvent::Wake);
            Ok(())
        })
        .unwrap_or(false)
    }

    fn process_pause(&self, sync: bool) -> bool {
        if !sync {
            return self.offer(Directive::Pause);
        }
        self.now(|| {
            self.set_paused(true);
            Ok(())
        })
        .unwrap_or(false)
    }

    fn process_step(&self, sync: bool) -> Result<bool, EngineError> {
        if !sync {
            return Ok(self.offer(Directive::Step));
        }
        self.now(|| {
            self.set_paused(true);
            self.step_once()
        })
    }

    fn process_back(&self, sync: bool) -> Result<bool, EngineError> {
        if !sync {
            return Ok(self.offer(Directive::Back));
        }
        self.now(|| {
            self.set_paused(true);
            self.back_once()
        })
    }

    fn process_reload(&self, sync: bool, settings: ReloadSettings) -> Result<bool, EngineError> {
        if !sync {
            return Ok(self.offer(Directive::Reload(settings)));
        }
        self.now(|| {
            self.set_paused(true);
            self.reload_now(settings)
        })
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.cancel.is_cancelled()
    }

    fn post(&self, command: DeferredCommand) -> Result<(), DeferredCommand> {
        if !self.is_alive() {
            return Err(command);
        }
        match self.events.send(LoopEvent::Task(command)) {
            Err(mpsc::error::SendError(LoopEvent::Task(command))) => Err(command),
            _ => Ok(()),
        }
    }

    fn close(&self) {
        self.cancel.cancel();
        let _ = self.events.send(LoopEvent::Close);
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
