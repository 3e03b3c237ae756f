// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, fakes, and assertion helpers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{Gates, ServerConfiguration};
use crate::command::Catalog;
use crate::config::ServerConfig;
use crate::engine::ast::Model;
use crate::engine::parser::parse_model;
use crate::engine::{Compiler, EngineError, Limits, World};
use crate::experiment::{Experiment, ExperimentController, ReloadSettings, SharedWorld};
use crate::gate::DeferredCommand;
use crate::state::ServerState;
use crate::transport::connection::{ConnectionHandle, Outbound};

/// A small model exercising globals, species, actions, and parameters.
pub const SAMPLE_MODEL: &str = r#"
model counter

global {
    int start <- 0;
    int total <- start;
    string label <- "counter";
    init {
        create walker number: 3;
        write "ready";
    }
    reflex tick {
        total <- total + 1;
    }
    action bump(int by) {
        total <- total + by;
        write "bumped " + string(by);
        return total;
    }
}

species walker {
    float distance <- 0.0;
    reflex walk { distance <- distance + 0.5; }
    action hop {
        distance <- distance + 10.0;
    }
}

experiment run {
    parameter "Start value" var: start;
}
"#;

pub fn sample_model() -> anyhow::Result<Arc<Model>> {
    let model = parse_model(SAMPLE_MODEL).map_err(|e| anyhow::anyhow!("{e:?}"))?;
    Ok(Arc::new(model))
}

pub fn sample_world() -> anyhow::Result<SharedWorld> {
    let world = World::new(sample_model()?, "run", vec![], None, Limits::history(8))?;
    Ok(Arc::new(Mutex::new(world)))
}

/// Builder for constructing `ServerState` in tests with sensible defaults.
pub struct StateBuilder {
    config: ServerConfig,
    compiler: Option<Arc<dyn Compiler>>,
    catalog: Option<Catalog>,
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBuilder {
    pub fn new() -> Self {
        Self { config: ServerConfig::test(), compiler: None, catalog: None }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> Arc<ServerState> {
        let mut state = ServerState::new(self.config, CancellationToken::new());
        if let Some(compiler) = self.compiler {
            state = state.with_compiler(compiler);
        }
        if let Some(catalog) = self.catalog {
            state = state.with_catalog(catalog);
        }
        Arc::new(state)
    }
}

/// One fake client connected to an in-process server state.
pub struct Harness {
    pub state: Arc<ServerState>,
    pub conn: ConnectionHandle,
    pub rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_state(StateBuilder::new().build())
    }

    pub fn with_state(state: Arc<ServerState>) -> Self {
        let (conn, rx) = ConnectionHandle::channel();
        state.connections.accept(conn.clone(), None);
        Self { state, conn, rx }
    }

    /// Another client on the same server.
    pub fn peer(&self) -> Self {
        Self::with_state(Arc::clone(&self.state))
    }

    /// Feed one raw frame through the receive pipeline.
    pub fn send_raw(&self, raw: &str) {
        crate::transport::ws::receive(&self.state, &self.conn, raw);
    }

    /// Send a request and return every frame queued so far.
    pub fn request(&mut self, request: Value) -> anyhow::Result<Vec<Value>> {
        self.send_raw(&request.to_string());
        drain_json(&mut self.rx)
    }

    /// Send a request and return the response to it, skipping pushes.
    pub fn call(&mut self, request: Value) -> anyhow::Result<Value> {
        self.request(request)?
            .into_iter()
            .find(|frame| frame.get("command").is_some())
            .ok_or_else(|| anyhow::anyhow!("no response"))
    }

    /// Register an experiment over the sample world, owned by this client.
    pub fn add_experiment(
        &self,
        controller: Arc<dyn ExperimentController>,
    ) -> anyhow::Result<Arc<Experiment>> {
        let world = sample_world()?;
        world.lock().take_emissions();
        let model = Arc::clone(world.lock().model());
        let experiment = Arc::new(Experiment {
            id: self.state.experiments.next_id(),
            name: "run".into(),
            model,
            world,
            controller,
        });
        self.state.messenger.register(ServerConfiguration::new(
            &experiment.id,
            self.conn.clone(),
            Gates::default(),
        ));
        self.state.experiments.insert(Arc::clone(&experiment));
        Ok(experiment)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller double with deterministic busy-slot behavior: an accepted
/// asynchronous directive keeps the slot until [`FakeController::settle`].
#[derive(Default)]
pub struct FakeController {
    running: AtomicBool,
    dead: AtomicBool,
    pending: AtomicBool,
    fail_step: Option<usize>,
    pub starts: AtomicUsize,
    pub pauses: AtomicUsize,
    pub steps: AtomicUsize,
    pub backs: AtomicUsize,
    pub reloads: AtomicUsize,
    pub closed: AtomicBool,
    posted: Mutex<Vec<DeferredCommand>>,
    accepted_reload: Mutex<Option<ReloadSettings>>,
}

impl FakeController {
    pub fn paused() -> Self {
        Self::default()
    }

    pub fn running() -> Self {
        let fake = Self::default();
        fake.running.store(true, Ordering::SeqCst);
        fake
    }

    pub fn dead() -> Self {
        let fake = Self::default();
        fake.dead.store(true, Ordering::SeqCst);
        fake
    }

    /// Occupy the directive slot from the start.
    pub fn busy(self) -> Self {
        self.pending.store(true, Ordering::SeqCst);
        self
    }

    /// Make the `n`-th step attempt (1-based) fail.
    pub fn fail_step(mut self, n: usize) -> Self {
        self.fail_step = Some(n);
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Free the directive slot, as the simulation thread would.
    pub fn settle(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Settings of the last accepted reload.
    pub fn take_reload(&self) -> Option<ReloadSettings> {
        self.accepted_reload.lock().take()
    }

    pub fn posted_count(&self) -> usize {
        self.posted.lock().len()
    }

    /// Run the deferred commands in order, as the simulation thread would.
    pub fn run_posted(&self) -> usize {
        let commands: Vec<DeferredCommand> = std::mem::take(&mut *self.posted.lock());
        let count = commands.len();
        for command in commands {
            command.run();
        }
        count
    }

    fn admit(&self, sync: bool) -> bool {
        if self.dead.load(Ordering::SeqCst) {
            return false;
        }
        let claimed =
            self.pending.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok();
        if claimed && sync {
            self.settle();
        }
        claimed
    }
}

impl ExperimentController for FakeController {
    fn process_start(&self, sync: bool) -> bool {
        let admitted = self.admit(sync);
        if admitted {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.running.store(true, Ordering::SeqCst);
        }
        admitted
    }

    fn process_pause(&self, sync: bool) -> bool {
        let admitted = self.admit(sync);
        if admitted {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
        }
        admitted
    }

    fn process_step(&self, sync: bool) -> Result<bool, EngineError> {
        if !self.admit(sync) {
            return Ok(false);
        }
        let n = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_step == Some(n) {
            return Err(EngineError::Type(format!("step {n} failed")));
        }
        Ok(true)
    }

    fn process_back(&self, sync: bool) -> Result<bool, EngineError> {
        if !self.admit(sync) {
            return Ok(false);
        }
        self.backs.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn process_reload(&self, sync: bool, settings: ReloadSettings) -> Result<bool, EngineError> {
        if !self.admit(sync) {
            return Ok(false);
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        *self.accepted_reload.lock() = Some(settings);
        Ok(true)
    }

    fn is_paused(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    fn is_alive(&self) -> bool {
        !self.dead.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn post(&self, command: DeferredCommand) -> Result<(), DeferredCommand> {
        if !self.is_alive() {
            return Err(command);
        }
        self.posted.lock().push(command);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Decode every text frame queued on `rx`. Pings and closes are skipped.
pub fn drain_json(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> anyhow::Result<Vec<Value>> {
    let mut frames = vec![];
    while let Ok(frame) = rx.try_recv() {
        if let Outbound::Text(text) = frame {
            frames.push(serde_json::from_str(&text)?);
        }
    }
    Ok(frames)
}

/// Block until a frame matching `predicate` arrives. Frames that do not
/// match are appended to `skipped`.
pub fn wait_json(
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    timeout: Duration,
    skipped: &mut Vec<Value>,
    predicate: impl Fn(&Value) -> bool,
) -> anyhow::Result<Value> {
    let deadline = Instant::now() + timeout;
    loop {
        match rx.try_recv() {
            Ok(Outbound::Text(text)) => {
                let frame: Value = serde_json::from_str(&text)?;
                if predicate(&frame) {
                    return Ok(frame);
                }
                skipped.push(frame);
            }
            Ok(_) => {}
            Err(_) if Instant::now() >= deadline => {
                anyhow::bail!("timed out; frames seen: {skipped:?}")
            }
            Err(_) => std::thread::sleep(Duration::from_millis(5)),
        }
    }
}

/// Frame predicate on `type` and, when given, `content`.
pub fn is_frame(kind: &'static str, content: Option<&'static str>) -> impl Fn(&Value) -> bool {
    move |frame| {
        frame["type"] == kind && content.is_none_or(|c| frame["content"] == c)
    }
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
/// Replaces `.map_err(|e| anyhow::anyhow!("{e}"))` with `.anyhow()`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Serve the WebSocket router on an ephemeral port for integration testing.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_ws_server(
    state: Arc<ServerState>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = crate::serve(listener, state).await;
    });
    Ok((addr, handle))
}
