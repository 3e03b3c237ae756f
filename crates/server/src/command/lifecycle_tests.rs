// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::{describe, DescribeFlags, Launch};
use crate::broadcast::{Gates, ServerConfiguration};
use crate::engine::{AgentRef, Value as EngineValue};
use crate::test_support::{
    drain_json, is_frame, sample_model, wait_json, FakeController, Harness, SAMPLE_MODEL,
};

const WAIT: Duration = Duration::from_secs(5);

fn model_file(dir: &tempfile::TempDir, name: &str, source: &str) -> anyhow::Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, source)?;
    Ok(path)
}

fn load(model: &Path, experiment: &str) -> Value {
    json!({"type": "load", "model": model.display().to_string(), "experiment": experiment})
}

#[yare::parameterized(
    no_fields = { json!({"type": "load"}) },
    no_experiment = { json!({"type": "load", "model": "a.gaml"}) },
    blank_model = { json!({"type": "load", "model": " ", "experiment": "run"}) },
)]
fn load_requires_model_and_experiment(request: Value) {
    let mut harness = Harness::new();
    let response = harness.call(request).expect("response");
    assert_eq!(response["type"], "MalformedRequest");
    assert_eq!(response["content"], "For 'load', mandatory parameters are: 'model' and 'experiment'");
}

#[test]
fn load_rejects_missing_and_foreign_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut harness = Harness::new();

    let missing = dir.path().join("absent.gaml");
    let response = harness.call(load(&missing, "run"))?;
    assert_eq!(response["type"], "UnableToExecuteRequest");
    assert_eq!(response["content"], format!("'{}' does not exist", missing.display()));

    let text = model_file(&dir, "model.txt", SAMPLE_MODEL)?;
    let response = harness.call(load(&text, "run"))?;
    assert_eq!(response["content"], format!("'{}' is not a gaml file", text.display()));
    Ok(())
}

#[test]
fn load_reports_compile_errors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = model_file(&dir, "broken.gaml", "model broken\nglobal { int x <- ; }\n")?;
    let mut harness = Harness::new();
    let response = harness.call(load(&broken, "run"))?;
    assert_eq!(response["type"], "UnableToExecuteRequest");
    let content = response["content"].as_str().unwrap_or_default();
    assert!(content.starts_with("Impossible to compile"), "got {content}");
    // The loading slot is released on failure.
    assert!(!harness.state.experiments.is_loading());
    Ok(())
}

#[test]
fn load_rejects_unknown_experiment_and_parameter() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = model_file(&dir, "counter.gaml", SAMPLE_MODEL)?;
    let mut harness = Harness::new();

    let response = harness.call(load(&path, "nope"))?;
    assert_eq!(
        response["content"],
        format!("'nope' is not an experiment present in '{}'", path.display())
    );

    let mut request = load(&path, "run");
    request["parameters"] = json!([{"name": "ghost", "value": 1}]);
    let response = harness.call(request)?;
    assert_eq!(response["content"], "Unknown parameter: ghost");
    assert!(harness.state.experiments.is_empty());
    Ok(())
}

#[test]
fn load_is_single_flight() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = model_file(&dir, "counter.gaml", SAMPLE_MODEL)?;
    let mut harness = Harness::new();
    let _busy = harness.state.experiments.begin_loading();

    let response = harness.call(load(&path, "run"))?;
    assert_eq!(response["type"], "UnableToExecuteRequest");
    assert_eq!(response["content"], "Unable to load: another one is loading");
    Ok(())
}

#[test]
fn load_builds_a_paused_experiment() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = model_file(&dir, "counter.gaml", SAMPLE_MODEL)?;
    let mut harness = Harness::new();

    let mut request = load(&path, "run");
    request["parameters"] = json!([{"name": "Start value", "value": 5}]);
    request["until"] = json!("cycle >= 10");
    harness.send_raw(&request.to_string());

    let mut seen = vec![];
    let response = wait_json(&mut harness.rx, WAIT, &mut seen, |f| f.get("command").is_some())?;
    assert_eq!(response["type"], "CommandExecutedSuccessfully");
    assert_eq!(response["content"], "run");
    let exp_id = response["exp_id"].as_str().unwrap_or_default().to_owned();
    assert_eq!(exp_id, "1");

    let paused = is_frame("SimulationStatus", Some("PAUSED"));
    if !seen.iter().any(&paused) {
        wait_json(&mut harness.rx, WAIT, &mut seen, &paused)?;
    }
    assert!(seen.iter().any(is_frame("SimulationStatus", Some("NOTREADY"))));
    assert!(seen.iter().any(is_frame("SimulationOutput", Some("ready"))));

    let experiment = harness.state.experiments.get(&exp_id).ok_or_else(|| anyhow::anyhow!("not loaded"))?;
    assert!(experiment.controller.is_paused());
    assert_eq!(experiment.world.lock().attribute(&AgentRef::World, "total"), Some(EngineValue::Int(5)));
    assert!(!harness.state.experiments.is_loading());

    harness.state.dispose_all();
    Ok(())
}

#[test]
fn load_honors_gates() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = model_file(&dir, "counter.gaml", SAMPLE_MODEL)?;
    let mut harness = Harness::new();

    let mut request = load(&path, "run");
    request["console"] = json!(false);
    harness.send_raw(&request.to_string());

    let mut seen = vec![];
    wait_json(&mut harness.rx, WAIT, &mut seen, is_frame("SimulationStatus", Some("PAUSED")))?;
    assert!(!seen.iter().any(is_frame("SimulationOutput", None)), "console output leaked: {seen:?}");
    harness.state.dispose_all();
    Ok(())
}

#[test]
fn stop_closes_every_experiment() -> anyhow::Result<()> {
    let mut harness = Harness::new();
    let fake = FakeController::running().arc();
    harness.add_experiment(fake.clone())?;

    let response = harness.call(json!({"type": "stop"}))?;
    assert_eq!(response["type"], "CommandExecutedSuccessfully");
    assert!(harness.state.experiments.is_empty());
    assert!(fake.closed.load(std::sync::atomic::Ordering::SeqCst));
    Ok(())
}

#[test]
fn stop_discards_a_load_in_flight() -> anyhow::Result<()> {
    let mut harness = Harness::new();
    let state = Arc::clone(&harness.state);
    let guard = state.experiments.begin_loading().ok_or_else(|| anyhow::anyhow!("slot taken"))?;
    let generation = state.experiments.generation();
    let exp_id = state.experiments.next_id();
    guard.assign(&exp_id);
    state.messenger.register(ServerConfiguration::new(&exp_id, harness.conn.clone(), Gates::default()));

    let frames = harness.request(json!({"type": "stop"}))?;
    assert!(frames.iter().any(is_frame("SimulationStatus", Some("NONE"))), "{frames:?}");
    assert!(state.messenger.configuration(&exp_id).is_none());

    // The build finishes after the stop was answered.
    let job = Launch {
        state: Arc::clone(&state),
        exp_id: exp_id.clone(),
        name: "run".into(),
        model: sample_model()?,
        parameters: vec![],
        until: None,
        generation,
    };
    job.run(guard);
    assert!(state.experiments.is_empty());
    assert!(!state.experiments.is_loading());
    assert!(state.messenger.configuration(&exp_id).is_none());
    assert!(drain_json(&mut harness.rx)?.is_empty());
    Ok(())
}

#[test]
fn describe_lists_experiments_and_species() -> anyhow::Result<()> {
    let model = sample_model()?;
    let all = DescribeFlags {
        experiments: true,
        species_names: true,
        species_variables: true,
        species_actions: true,
    };
    let described = describe(&model, all);
    assert_eq!(described["name"], "counter");
    assert_eq!(
        described["experiments"],
        json!([{"name": "run", "parameters": [{"name": "Start value", "var": "start", "type": "int"}]}])
    );

    let species = described["species"].as_array().cloned().unwrap_or_default();
    let names: Vec<&str> = species.iter().filter_map(|s| s["name"].as_str()).collect();
    assert_eq!(names, vec!["counter", "walker"]);
    assert_eq!(species[1]["variables"], json!([{"name": "distance", "type": "float"}]));
    assert_eq!(species[0]["actions"], json!([{"name": "bump", "args": [{"name": "by", "type": "int"}]}]));
    Ok(())
}

#[test]
fn describe_flags_trim_the_output() -> anyhow::Result<()> {
    let model = sample_model()?;
    let names_only = DescribeFlags {
        experiments: false,
        species_names: true,
        species_variables: false,
        species_actions: false,
    };
    let described = describe(&model, names_only);
    assert!(described.get("experiments").is_none());
    assert_eq!(described["species"], json!([{"name": "counter"}, {"name": "walker"}]));
    Ok(())
}

#[test]
fn describe_command_reads_the_model_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = model_file(&dir, "counter.gaml", SAMPLE_MODEL)?;
    let mut harness = Harness::new();

    let response = harness.call(json!({
        "type": "describe",
        "model": path.display().to_string(),
        "speciesVariables": false,
        "speciesActions": "false",
    }))?;
    assert_eq!(response["type"], "CommandExecutedSuccessfully");
    assert_eq!(response["content"]["species"][1], json!({"name": "walker"}));

    let response = harness.call(json!({"type": "describe"}))?;
    assert_eq!(response["type"], "MalformedRequest");
    assert_eq!(response["content"], "For 'describe', mandatory parameter is: 'model'");
    Ok(())
}
