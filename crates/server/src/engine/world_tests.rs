// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::{AgentRef, Emission, Limits, World};
use crate::engine::parser::{parse_expression, parse_model};
use crate::engine::value::Value;
use crate::engine::EngineError;

const COUNTER: &str = r#"
model counter

global {
    int start <- 0;
    int total <- start;
    init {
        create walker number: 3;
        write "ready";
    }
    reflex tick {
        total <- total + 1;
    }
    action bump(int by) {
        total <- total + by;
        return total;
    }
}

species walker {
    float distance <- 0.0;
    reflex walk { distance <- distance + 0.5; }
}

experiment run {
    parameter "Start value" var: start;
}
"#;

fn world(parameters: Vec<(String, Value)>, until: Option<&str>) -> anyhow::Result<World> {
    let model = Arc::new(parse_model(COUNTER).map_err(|e| anyhow::anyhow!("{e:?}"))?);
    let until = match until {
        Some(text) => Some(parse_expression(text).map_err(|e| anyhow::anyhow!("{e:?}"))?),
        None => None,
    };
    Ok(World::new(model, "run", parameters, until, Limits::history(10))?)
}

#[test]
fn init_creates_agents_and_emits_output() -> anyhow::Result<()> {
    let mut world = world(vec![], None)?;
    assert_eq!(world.cycle(), 0);
    assert_eq!(world.population("walker"), 3);
    assert_eq!(world.take_emissions(), vec![Emission::Write("ready".into())]);
    assert!(world.take_emissions().is_empty());
    Ok(())
}

#[test]
fn step_runs_world_then_species_reflexes() -> anyhow::Result<()> {
    let mut world = world(vec![], None)?;
    let outcome = world.step()?;
    assert_eq!(outcome.cycle, 1);
    assert!(!outcome.ended);
    assert_eq!(world.attribute(&AgentRef::World, "total"), Some(Value::Int(1)));
    let second = AgentRef::Member { species: "walker".into(), index: 1 };
    assert_eq!(world.attribute(&second, "distance"), Some(Value::Float(0.5)));
    Ok(())
}

#[test]
fn parameters_apply_by_title_or_name() -> anyhow::Result<()> {
    let by_title = world(vec![("Start value".into(), Value::Int(7))], None)?;
    assert_eq!(by_title.attribute(&AgentRef::World, "start"), Some(Value::Int(7)));
    let by_name = world(vec![("start".into(), Value::Str("4".into()))], None)?;
    assert_eq!(by_name.attribute(&AgentRef::World, "start"), Some(Value::Int(4)));
    Ok(())
}

#[test]
fn unknown_parameter_is_rejected() {
    let result = world(vec![("speed".into(), Value::Int(1))], None);
    assert!(result.is_err());
}

#[test]
fn stop_condition_ends_the_run() -> anyhow::Result<()> {
    let mut world = world(vec![], Some("cycle >= 2"))?;
    assert!(!world.step()?.ended);
    assert!(world.step()?.ended);
    Ok(())
}

#[test]
fn back_restores_previous_cycle() -> anyhow::Result<()> {
    let mut world = world(vec![], None)?;
    world.step()?;
    world.step()?;
    assert_eq!(world.back()?, 1);
    assert_eq!(world.attribute(&AgentRef::World, "total"), Some(Value::Int(1)));
    assert_eq!(world.back()?, 0);
    assert_eq!(world.back(), Err(EngineError::NoHistory));
    Ok(())
}

#[test]
fn history_is_bounded() -> anyhow::Result<()> {
    let mut world = world(vec![], None)?;
    for _ in 0..15 {
        world.step()?;
    }
    assert_eq!(world.history_len(), 10);
    Ok(())
}

#[test]
fn reload_returns_to_cycle_zero() -> anyhow::Result<()> {
    let mut world = world(vec![], None)?;
    world.step()?;
    world.set_parameters(vec![("start".into(), Value::Int(10))])?;
    world.reload()?;
    assert_eq!(world.cycle(), 0);
    assert_eq!(world.attribute(&AgentRef::World, "total"), Some(Value::Int(10)));
    assert_eq!(world.history_len(), 0);
    Ok(())
}

#[yare::parameterized(
    world_name = { "world", Some(AgentRef::World) },
    empty = { "", Some(AgentRef::World) },
    brackets = { "walker[2]", Some(AgentRef::Member { species: "walker".into(), index: 2 }) },
    parens = { "walker(0)", Some(AgentRef::Member { species: "walker".into(), index: 0 }) },
    garbage = { "walker[x]", None },
    bare_index = { "[1]", None },
)]
fn parses_agent_references(text: &str, expected: Option<AgentRef>) {
    assert_eq!(AgentRef::parse(text), expected);
}

#[test]
fn creation_beyond_the_agent_limit_fails_whole() -> anyhow::Result<()> {
    let model = Arc::new(parse_model(COUNTER).map_err(|e| anyhow::anyhow!("{e:?}"))?);
    let tight = Limits { history_depth: 0, max_agents: 2 };
    let error = World::new(Arc::clone(&model), "run", vec![], None, tight).err();
    assert_eq!(error, Some(EngineError::TooManyAgents { requested: 3, limit: 2 }));

    let world = World::new(model, "run", vec![], None, Limits { history_depth: 0, max_agents: 3 })?;
    assert_eq!(world.population("walker"), 3);
    Ok(())
}
