// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::Experiments;
use crate::experiment::Experiment;
use crate::test_support::{sample_world, FakeController};

fn experiment(registry: &Experiments) -> anyhow::Result<Arc<Experiment>> {
    let world = sample_world()?;
    let model = Arc::clone(world.lock().model());
    Ok(Arc::new(Experiment {
        id: registry.next_id(),
        name: "run".into(),
        model,
        world,
        controller: FakeController::paused().arc(),
    }))
}

#[test]
fn ids_are_sequential() {
    let registry = Experiments::new();
    assert_eq!(registry.next_id(), "1");
    assert_eq!(registry.next_id(), "2");
}

#[test]
fn loading_slot_is_single_flight() {
    let registry = Arc::new(Experiments::new());
    let guard = registry.begin_loading();
    assert!(guard.is_some());
    assert!(registry.is_loading());
    assert!(registry.begin_loading().is_none());

    drop(guard);
    assert!(!registry.is_loading());
    assert!(registry.begin_loading().is_some());
}

#[test]
fn frontmost_follows_inserts_and_removals() -> anyhow::Result<()> {
    let registry = Experiments::new();
    let first = experiment(&registry)?;
    let second = experiment(&registry)?;
    registry.insert(Arc::clone(&first));
    registry.insert(Arc::clone(&second));
    assert_eq!(registry.frontmost().map(|e| e.id.clone()), Some(second.id.clone()));

    registry.remove(&second.id);
    assert_eq!(registry.frontmost().map(|e| e.id.clone()), Some(first.id.clone()));
    assert_eq!(registry.len(), 1);

    registry.remove(&first.id);
    assert!(registry.frontmost().is_none());
    Ok(())
}

#[test]
fn removing_an_older_experiment_keeps_the_frontmost() -> anyhow::Result<()> {
    let registry = Experiments::new();
    let ids: Vec<String> = (0..3)
        .map(|_| {
            let experiment = experiment(&registry)?;
            registry.insert(Arc::clone(&experiment));
            Ok(experiment.id.clone())
        })
        .collect::<anyhow::Result<_>>()?;

    registry.remove(&ids[0]);
    assert_eq!(registry.frontmost().map(|e| e.id.clone()), Some(ids[2].clone()));
    registry.remove(&ids[2]);
    assert_eq!(registry.frontmost().map(|e| e.id.clone()), Some(ids[1].clone()));
    Ok(())
}

#[test]
fn drain_makes_pending_loads_stale() -> anyhow::Result<()> {
    let registry = Experiments::new();
    let generation = registry.generation();
    let fresh = experiment(&registry)?;
    assert!(registry.insert_current(fresh, generation).is_ok());

    let late = experiment(&registry)?;
    registry.drain();
    let rejected = registry.insert_current(late, generation);
    assert!(rejected.is_err());
    assert!(registry.is_empty());
    assert!(registry.frontmost().is_none());
    Ok(())
}

#[test]
fn loading_guard_tracks_the_reserved_id() {
    let registry = Arc::new(Experiments::new());
    let guard = registry.begin_loading();
    assert!(registry.loading_id().is_none());
    if let Some(guard) = &guard {
        guard.assign("7");
    }
    assert_eq!(registry.loading_id().as_deref(), Some("7"));
    drop(guard);
    assert!(registry.loading_id().is_none());
}

#[test]
fn drain_empties_the_registry() -> anyhow::Result<()> {
    let registry = Experiments::new();
    for _ in 0..3 {
        let experiment = experiment(&registry)?;
        registry.insert(experiment);
    }
    assert_eq!(registry.drain().len(), 3);
    assert!(registry.is_empty());
    assert!(registry.frontmost().is_none());
    Ok(())
}
