// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The running state of one experiment: the world agent, species
//! populations, cycle counter, and a bounded history for stepping back.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::ast::{ActionDecl, BinOp, Expr, Model, SpeciesDecl, SpeciesKind, Stmt, UnOp};
use super::value::{Value, ValueType};
use super::EngineError;

/// Names that designate the world agent in agent references.
const WORLD_NAMES: &[&str] = &["", "world", "simulation", "experiment"];

/// Identifies an agent: the world agent or the n-th member of a species.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgentRef {
    World,
    Member { species: String, index: usize },
}

impl AgentRef {
    /// Parse `world`, `prey[3]`, or `prey(3)`. Existence is not checked.
    pub fn parse(text: &str) -> Option<AgentRef> {
        let text = text.trim();
        if WORLD_NAMES.contains(&text) {
            return Some(AgentRef::World);
        }
        let open = text.find(['[', '('])?;
        let close = if text[open..].starts_with('[') { ']' } else { ')' };
        let inner = text[open + 1..].strip_suffix(close)?;
        let species = text[..open].trim();
        if species.is_empty() {
            return None;
        }
        let index = inner.trim().parse().ok()?;
        Some(AgentRef::Member { species: species.to_owned(), index })
    }
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::World => f.write_str("world"),
            Self::Member { species, index } => write!(f, "{species}[{index}]"),
        }
    }
}

/// Text produced by a world for its clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// `write`: console output.
    Write(String),
    /// `debug`: debug console output.
    Debug(String),
    /// `tell`: a dialog for the user.
    Tell(String),
}

/// Agent cap used when none is configured.
pub const DEFAULT_MAX_AGENTS: usize = 1_000_000;

/// Resource bounds of one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Past cycles kept for `back`.
    pub history_depth: usize,
    /// Agents across every population, dead ones included.
    pub max_agents: usize,
}

impl Limits {
    pub fn history(history_depth: usize) -> Self {
        Self { history_depth, ..Self::default() }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self { history_depth: 0, max_agents: DEFAULT_MAX_AGENTS }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub cycle: u64,
    /// The stop condition became true after this step.
    pub ended: bool,
}

#[derive(Debug, Clone)]
struct Agent {
    attributes: IndexMap<String, Value>,
    alive: bool,
}

#[derive(Debug, Clone)]
struct Snapshot {
    cycle: u64,
    global: Agent,
    populations: IndexMap<String, Vec<Agent>>,
}

pub(super) struct Frame {
    pub(super) agent: AgentRef,
    locals: HashMap<String, Value>,
}

impl Frame {
    pub(super) fn new(agent: AgentRef) -> Self {
        Self { agent, locals: HashMap::new() }
    }
}

enum Flow {
    Next,
    Return(Value),
}

pub struct World {
    model: Arc<Model>,
    experiment: String,
    cycle: u64,
    global: Agent,
    populations: IndexMap<String, Vec<Agent>>,
    /// Action tables per species name, including temporary actions.
    pub(super) actions: HashMap<String, IndexMap<String, Arc<ActionDecl>>>,
    history: VecDeque<Snapshot>,
    history_depth: usize,
    max_agents: usize,
    overrides: IndexMap<String, Value>,
    stop_condition: Option<Expr>,
    emissions: Vec<Emission>,
    pub(super) open_scopes: usize,
    pub(super) temp_seq: u64,
}

impl World {
    /// Instantiate `experiment` of `model` and run its initialization.
    ///
    /// `parameters` are applied by title or by variable name before the
    /// global `init` block runs.
    pub fn new(
        model: Arc<Model>,
        experiment: &str,
        parameters: Vec<(String, Value)>,
        stop_condition: Option<Expr>,
        limits: Limits,
    ) -> Result<World, EngineError> {
        let actions = build_action_tables(&model);
        let mut world = World {
            model,
            experiment: experiment.to_owned(),
            cycle: 0,
            global: Agent { attributes: IndexMap::new(), alive: true },
            populations: IndexMap::new(),
            actions,
            history: VecDeque::new(),
            history_depth: limits.history_depth,
            max_agents: limits.max_agents,
            overrides: IndexMap::new(),
            stop_condition,
            emissions: vec![],
            open_scopes: 0,
            temp_seq: 0,
        };
        world.set_parameters(parameters)?;
        world.initialize()?;
        Ok(world)
    }

    /// A world over the empty platform model.
    pub fn platform() -> World {
        let model = Arc::new(Model::platform());
        World {
            actions: build_action_tables(&model),
            model,
            experiment: String::new(),
            cycle: 0,
            global: Agent { attributes: IndexMap::new(), alive: true },
            populations: IndexMap::new(),
            history: VecDeque::new(),
            history_depth: 0,
            max_agents: DEFAULT_MAX_AGENTS,
            overrides: IndexMap::new(),
            stop_condition: None,
            emissions: vec![],
            open_scopes: 0,
            temp_seq: 0,
        }
    }

    // -- Accessors -----------------------------------------------------------

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn experiment_name(&self) -> &str {
        &self.experiment
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Number of living members of `species`.
    pub fn population(&self, species: &str) -> usize {
        self.populations.get(species).map(|p| p.iter().filter(|a| a.alive).count()).unwrap_or(0)
    }

    pub fn attribute(&self, agent: &AgentRef, name: &str) -> Option<Value> {
        self.agent(agent).and_then(|a| a.attributes.get(name).cloned())
    }

    pub fn has_agent(&self, agent: &AgentRef) -> bool {
        self.agent(agent).is_some()
    }

    pub fn has_action(&self, agent: &AgentRef, action: &str) -> bool {
        self.species_of(agent)
            .and_then(|species| self.actions.get(species))
            .is_some_and(|table| table.contains_key(action))
    }

    /// Actions currently callable on members of `species`.
    pub fn action_count(&self, species: &str) -> usize {
        self.actions.get(species).map(IndexMap::len).unwrap_or(0)
    }

    /// Scopes opened with [`World::scope`] and not yet released.
    pub fn open_scopes(&self) -> usize {
        self.open_scopes
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drain text produced since the last call.
    pub fn take_emissions(&mut self) -> Vec<Emission> {
        std::mem::take(&mut self.emissions)
    }

    /// Map a parameter title or a global variable name to the variable.
    pub fn resolve_parameter(&self, name: &str) -> Option<String> {
        let by_title = self
            .model
            .experiment(&self.experiment)
            .and_then(|e| e.parameters.iter().find(|p| p.title == name))
            .map(|p| p.var.clone());
        by_title.or_else(|| self.model.global.attribute(name).map(|a| a.name.clone()))
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Record parameter values to apply on the next initialization.
    /// Nothing is recorded when any name is unknown.
    pub fn set_parameters(&mut self, parameters: Vec<(String, Value)>) -> Result<(), EngineError> {
        let resolved = parameters
            .into_iter()
            .map(|(name, value)| match self.resolve_parameter(&name) {
                Some(var) => Ok((var, value)),
                None => Err(EngineError::UnknownParameter(name)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.overrides.extend(resolved);
        Ok(())
    }

    pub fn set_stop_condition(&mut self, condition: Option<Expr>) {
        self.stop_condition = condition;
    }

    /// Restart from cycle 0 with the current parameters.
    pub fn reload(&mut self) -> Result<(), EngineError> {
        self.initialize()
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        let model = Arc::clone(&self.model);
        self.cycle = 0;
        self.history.clear();
        self.global = default_agent(&model.global);
        self.populations = model.species.iter().map(|s| (s.name.clone(), vec![])).collect();
        self.actions = build_action_tables(&model);

        let mut frame = Frame::new(AgentRef::World);
        for attribute in &model.global.attributes {
            if let Some(var) = self.overrides.get(&attribute.name).cloned() {
                self.global.attributes.insert(attribute.name.clone(), var.coerce(attribute.ty)?);
            } else if let Some(init) = &attribute.init {
                let value = self.eval(init, &frame)?.coerce(attribute.ty)?;
                self.global.attributes.insert(attribute.name.clone(), value);
            }
        }

        for species in model.species.iter().filter(|s| s.kind == SpeciesKind::Grid) {
            if let Some((width, height)) = &species.cells {
                let count = self.eval_count(width, &frame)? * self.eval_count(height, &frame)?;
                self.create(species, count)?;
            }
        }

        self.exec_block(&model.global.init, &mut frame)?;
        Ok(())
    }

    /// Advance one cycle: the world's reflexes first, then each species in
    /// declaration order. Agents created during the cycle act from the next one.
    pub fn step(&mut self) -> Result<StepOutcome, EngineError> {
        if self.history_depth > 0 {
            if self.history.len() == self.history_depth {
                self.history.pop_front();
            }
            self.history.push_back(Snapshot {
                cycle: self.cycle,
                global: self.global.clone(),
                populations: self.populations.clone(),
            });
        }
        self.cycle += 1;

        let model = Arc::clone(&self.model);
        self.run_reflexes(&model.global, AgentRef::World)?;
        for species in &model.species {
            let count = self.populations.get(&species.name).map(Vec::len).unwrap_or(0);
            for index in 0..count {
                let alive = self
                    .populations
                    .get(&species.name)
                    .and_then(|p| p.get(index))
                    .is_some_and(|a| a.alive);
                if alive {
                    let agent = AgentRef::Member { species: species.name.clone(), index };
                    self.run_reflexes(species, agent)?;
                }
            }
        }

        let ended = match self.stop_condition.clone() {
            Some(condition) => self.eval(&condition, &Frame::new(AgentRef::World))?.truthy()?,
            None => false,
        };
        Ok(StepOutcome { cycle: self.cycle, ended })
    }

    /// Restore the state before the last step.
    pub fn back(&mut self) -> Result<u64, EngineError> {
        let snapshot = self.history.pop_back().ok_or(EngineError::NoHistory)?;
        self.cycle = snapshot.cycle;
        self.global = snapshot.global;
        self.populations = snapshot.populations;
        Ok(self.cycle)
    }

    fn run_reflexes(&mut self, species: &SpeciesDecl, agent: AgentRef) -> Result<(), EngineError> {
        for reflex in &species.reflexes {
            let mut frame = Frame::new(agent.clone());
            if let Some(when) = &reflex.when {
                if !self.eval(when, &frame)?.truthy()? {
                    continue;
                }
            }
            self.exec_block(&reflex.body, &mut frame)?;
        }
        Ok(())
    }

    fn create(&mut self, species: &SpeciesDecl, count: usize) -> Result<(), EngineError> {
        let existing: usize = self.populations.values().map(Vec::len).sum();
        if count > self.max_agents.saturating_sub(existing) {
            return Err(EngineError::TooManyAgents { requested: count, limit: self.max_agents });
        }
        for _ in 0..count {
            let population = self.populations.entry(species.name.clone()).or_default();
            let index = population.len();
            population.push(default_agent(species));
            let agent = AgentRef::Member { species: species.name.clone(), index };
            let mut frame = Frame::new(agent.clone());
            for attribute in &species.attributes {
                if let Some(init) = &attribute.init {
                    let value = self.eval(init, &frame)?.coerce(attribute.ty)?;
                    if let Some(a) = self.agent_mut(&agent) {
                        a.attributes.insert(attribute.name.clone(), value);
                    }
                }
            }
            self.exec_block(&species.init, &mut frame)?;
        }
        Ok(())
    }

    // -- Agents and actions --------------------------------------------------

    fn agent(&self, agent: &AgentRef) -> Option<&Agent> {
        match agent {
            AgentRef::World => Some(&self.global),
            AgentRef::Member { species, index } => {
                self.populations.get(species)?.get(*index).filter(|a| a.alive)
            }
        }
    }

    fn agent_mut(&mut self, agent: &AgentRef) -> Option<&mut Agent> {
        match agent {
            AgentRef::World => Some(&mut self.global),
            AgentRef::Member { species, index } => {
                self.populations.get_mut(species)?.get_mut(*index).filter(|a| a.alive)
            }
        }
    }

    pub(super) fn species_of<'a>(&'a self, agent: &'a AgentRef) -> Option<&'a str> {
        match agent {
            AgentRef::World => Some(&self.model.global.name),
            AgentRef::Member { species, .. } => {
                self.populations.contains_key(species).then_some(species.as_str())
            }
        }
    }

    /// Run `action` on `agent`. Missing arguments take their type's default.
    pub(super) fn call_action(
        &mut self,
        agent: &AgentRef,
        action: &str,
        mut args: IndexMap<String, Value>,
    ) -> Result<Value, EngineError> {
        if !self.has_agent(agent) {
            return Err(EngineError::UnknownAgent(agent.to_string()));
        }
        let decl = self
            .species_of(agent)
            .and_then(|species| self.actions.get(species))
            .and_then(|table| table.get(action))
            .cloned()
            .ok_or_else(|| EngineError::UnknownAction {
                action: action.to_owned(),
                agent: agent.to_string(),
            })?;

        let mut frame = Frame::new(agent.clone());
        for (ty, name) in &decl.params {
            let value = match args.shift_remove(name) {
                Some(value) => value.coerce(*ty)?,
                None => ty.default_value(),
            };
            frame.locals.insert(name.clone(), value);
        }
        match self.exec_block(&decl.body, &mut frame)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Nil),
        }
    }

    // -- Statements ----------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], frame: &mut Frame) -> Result<Flow, EngineError> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt, frame)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, EngineError> {
        match stmt {
            Stmt::Declare { ty, name, init } => {
                let value = match init {
                    Some(init) => self.eval(init, frame)?.coerce(*ty)?,
                    None => ty.default_value(),
                };
                frame.locals.insert(name.clone(), value);
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value, frame)?;
                self.assign(target, value, frame)?;
            }
            Stmt::Write(expr) => {
                let text = self.eval(expr, frame)?.to_string();
                self.emissions.push(Emission::Write(text));
            }
            Stmt::Debug(expr) => {
                let text = self.eval(expr, frame)?.to_string();
                self.emissions.push(Emission::Debug(text));
            }
            Stmt::Tell(expr) => {
                let text = self.eval(expr, frame)?.to_string();
                self.emissions.push(Emission::Tell(text));
            }
            Stmt::Create { species, number } => {
                let count = match number {
                    Some(number) => self.eval_count(number, frame)?,
                    None => 1,
                };
                let model = Arc::clone(&self.model);
                let decl = model
                    .species
                    .iter()
                    .find(|s| &s.name == species)
                    .ok_or_else(|| EngineError::UnknownSpecies(species.clone()))?;
                self.create(decl, count)?;
            }
            Stmt::Do { action, args } => {
                let mut values = IndexMap::new();
                for (name, expr) in args {
                    values.insert(name.clone(), self.eval(expr, frame)?);
                }
                let agent = frame.agent.clone();
                self.call_action(&agent, action, values)?;
            }
            Stmt::If { cond, then, otherwise } => {
                let branch = if self.eval(cond, frame)?.truthy()? { then } else { otherwise };
                return self.exec_block(branch, frame);
            }
            Stmt::Loop { times, body } => {
                let count = self.eval_count(times, frame)?;
                for _ in 0..count {
                    if let Flow::Return(value) = self.exec_block(body, frame)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn assign(&mut self, target: &str, value: Value, frame: &mut Frame) -> Result<(), EngineError> {
        if let Some(slot) = frame.locals.get_mut(target) {
            *slot = value;
            return Ok(());
        }
        let model = Arc::clone(&self.model);
        let owner = match &frame.agent {
            AgentRef::Member { species, .. } if model.species(species).and_then(|s| s.attribute(target)).is_some() => {
                frame.agent.clone()
            }
            _ => AgentRef::World,
        };
        let declared = match &owner {
            AgentRef::World => model.global.attribute(target),
            AgentRef::Member { species, .. } => model.species(species).and_then(|s| s.attribute(target)),
        };
        let Some(declared) = declared else {
            return Err(EngineError::UnknownVariable(target.to_owned()));
        };
        let value = value.coerce(declared.ty)?;
        match self.agent_mut(&owner) {
            Some(agent) => {
                agent.attributes.insert(target.to_owned(), value);
                Ok(())
            }
            None => Err(EngineError::UnknownAgent(owner.to_string())),
        }
    }

    // -- Expressions ---------------------------------------------------------

    fn eval_count(&self, expr: &Expr, frame: &Frame) -> Result<usize, EngineError> {
        match self.eval(expr, frame)?.coerce(ValueType::Int)? {
            Value::Int(n) => Ok(usize::try_from(n).unwrap_or(0)),
            other => Err(EngineError::Type(format!("expected an int but got {}", other.type_name()))),
        }
    }

    pub(super) fn eval(&self, expr: &Expr, frame: &Frame) -> Result<Value, EngineError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Var(name) => self.lookup(name, frame),
            Expr::List(items) => {
                items.iter().map(|item| self.eval(item, frame)).collect::<Result<_, _>>().map(Value::List)
            }
            Expr::Unary(op, inner) => {
                let value = self.eval(inner, frame)?;
                match (op, value) {
                    (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
                    (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnOp::Not, value) => Ok(Value::Bool(!value.truthy()?)),
                    (UnOp::Neg, other) => {
                        Err(EngineError::Type(format!("cannot negate a {}", other.type_name())))
                    }
                }
            }
            Expr::Binary(BinOp::And, left, right) => {
                Ok(Value::Bool(self.eval(left, frame)?.truthy()? && self.eval(right, frame)?.truthy()?))
            }
            Expr::Binary(BinOp::Or, left, right) => {
                Ok(Value::Bool(self.eval(left, frame)?.truthy()? || self.eval(right, frame)?.truthy()?))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                binary(*op, left, right)
            }
            Expr::Call(name, args) => {
                let args = args.iter().map(|a| self.eval(a, frame)).collect::<Result<Vec<_>, _>>()?;
                builtin(name, args)
            }
        }
    }

    fn lookup(&self, name: &str, frame: &Frame) -> Result<Value, EngineError> {
        if let Some(value) = frame.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.agent(&frame.agent).and_then(|a| a.attributes.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.global.attributes.get(name) {
            return Ok(value.clone());
        }
        match name {
            "cycle" => return Ok(Value::Int(i64::try_from(self.cycle).unwrap_or(i64::MAX))),
            "self" => return Ok(Value::Str(frame.agent.to_string())),
            _ => {}
        }
        if let Some(population) = self.populations.get(name) {
            let members = population
                .iter()
                .enumerate()
                .filter(|(_, a)| a.alive)
                .map(|(index, _)| Value::Str(format!("{name}[{index}]")))
                .collect();
            return Ok(Value::List(members));
        }
        Err(EngineError::UnknownVariable(name.to_owned()))
    }
}

fn default_agent(species: &SpeciesDecl) -> Agent {
    let attributes =
        species.attributes.iter().map(|a| (a.name.clone(), a.ty.default_value())).collect();
    Agent { attributes, alive: true }
}

fn build_action_tables(model: &Model) -> HashMap<String, IndexMap<String, Arc<ActionDecl>>> {
    std::iter::once(&model.global)
        .chain(model.species.iter())
        .map(|species| {
            let table =
                species.actions.iter().map(|a| (a.name.clone(), Arc::new(a.clone()))).collect();
            (species.name.clone(), table)
        })
        .collect()
}

fn type_error(op: &str, left: &Value, right: &Value) -> EngineError {
    EngineError::Type(format!(
        "cannot apply {op} to {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, EngineError> {
    use Value::{Float, Int, List, Str};
    match op {
        BinOp::Add => match (left, right) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_add(b))),
            (Str(a), b) => Ok(Str(format!("{a}{b}"))),
            (a, Str(b)) => Ok(Str(format!("{a}{b}"))),
            (List(mut a), List(b)) => {
                a.extend(b);
                Ok(List(a))
            }
            (List(mut a), b) => {
                a.push(b);
                Ok(List(a))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Float(x + y)),
                _ => Err(type_error("+", &a, &b)),
            },
        },
        BinOp::Sub => match (left, right) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_sub(b))),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Float(x - y)),
                _ => Err(type_error("-", &a, &b)),
            },
        },
        BinOp::Mul => match (left, right) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_mul(b))),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Float(x * y)),
                _ => Err(type_error("*", &a, &b)),
            },
        },
        // Division always yields a float, as in GAML.
        BinOp::Div => match (left.as_f64(), right.as_f64()) {
            (Some(_), Some(y)) if y == 0.0 => Err(EngineError::DivisionByZero),
            (Some(x), Some(y)) => Ok(Float(x / y)),
            _ => Err(type_error("/", &left, &right)),
        },
        BinOp::Eq => Ok(Value::Bool(equals(&left, &right))),
        BinOp::Ne => Ok(Value::Bool(!equals(&left, &right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (&left, &right) {
                (Str(a), Str(b)) => a.partial_cmp(b),
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                },
            };
            let ordering = ordering.ok_or_else(|| type_error("comparison", &left, &right))?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinOp::And | BinOp::Or => Ok(Value::Bool(left.truthy()? && right.truthy()?)),
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => left == right,
    }
}

fn builtin(name: &str, args: Vec<Value>) -> Result<Value, EngineError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(EngineError::Type(format!("{name} expects {n} argument(s), got {}", args.len())))
        }
    };
    match name {
        "length" => {
            arity(1)?;
            match &args[0] {
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(EngineError::Type(format!("length of a {}", other.type_name()))),
            }
        }
        "string" => {
            arity(1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "int" => {
            arity(1)?;
            args[0].clone().coerce(ValueType::Int)
        }
        "float" => {
            arity(1)?;
            args[0].clone().coerce(ValueType::Float)
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(EngineError::Type(format!("abs of a {}", other.type_name()))),
            }
        }
        "sqrt" => {
            arity(1)?;
            let x = args[0].as_f64().ok_or_else(|| EngineError::Type("sqrt of a non-number".into()))?;
            Ok(Value::Float(x.sqrt()))
        }
        "round" => {
            arity(1)?;
            let x = args[0].as_f64().ok_or_else(|| EngineError::Type("round of a non-number".into()))?;
            Ok(Value::Int(x.round() as i64))
        }
        "min" | "max" | "sum" => {
            let items = match args.as_slice() {
                [Value::List(items)] => items.clone(),
                _ => args,
            };
            let mut iter = items.into_iter();
            let first = iter.next().ok_or_else(|| EngineError::Type(format!("{name} of nothing")))?;
            iter.try_fold(first, |acc, item| match name {
                "sum" => binary(BinOp::Add, acc, item),
                "min" => Ok(if binary(BinOp::Lt, item.clone(), acc.clone())?.truthy()? { item } else { acc }),
                _ => Ok(if binary(BinOp::Gt, item.clone(), acc.clone())?.truthy()? { item } else { acc }),
            })
        }
        _ => Err(EngineError::UnknownFunction(name.to_owned())),
    }
}

#[cfg(test)]
#[path = "world_tests.rs"]
mod tests;
