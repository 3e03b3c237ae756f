// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::Experiment;

/// Every loaded experiment, keyed by its `exp_id`.
#[derive(Default)]
pub struct Experiments {
    entries: DashMap<String, Arc<Experiment>>,
    loading: AtomicBool,
    loading_id: Mutex<Option<String>>,
    frontmost: RwLock<Option<String>>,
    next_id: AtomicU64,
    /// Bumped by [`Experiments::drain`]; loads started before it are stale.
    generation: AtomicU64,
}

impl Experiments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single loading slot. The slot is held until the returned
    /// guard drops, however the load ends.
    pub fn begin_loading(self: &Arc<Self>) -> Option<LoadingGuard> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard { registry: Arc::clone(self) })
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// The id reserved by the load in flight, once it has one.
    pub fn loading_id(&self) -> Option<String> {
        self.loading_id.lock().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn next_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Register `experiment` and make it the frontmost one.
    pub fn insert(&self, experiment: Arc<Experiment>) {
        let mut frontmost = self.frontmost.write();
        *frontmost = Some(experiment.id.clone());
        self.entries.insert(experiment.id.clone(), experiment);
    }

    /// Register `experiment` unless a drain happened since `generation` was
    /// read. Gives the experiment back when it is stale.
    pub fn insert_current(
        &self,
        experiment: Arc<Experiment>,
        generation: u64,
    ) -> Result<(), Arc<Experiment>> {
        let mut frontmost = self.frontmost.write();
        if self.generation.load(Ordering::Acquire) != generation {
            return Err(experiment);
        }
        *frontmost = Some(experiment.id.clone());
        self.entries.insert(experiment.id.clone(), experiment);
        Ok(())
    }

    pub fn get(&self, exp_id: &str) -> Option<Arc<Experiment>> {
        self.entries.get(exp_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Unregister `exp_id`. When it was frontmost, the newest remaining
    /// experiment takes its place.
    pub fn remove(&self, exp_id: &str) -> Option<Arc<Experiment>> {
        let mut frontmost = self.frontmost.write();
        let removed = self.entries.remove(exp_id).map(|(_, experiment)| experiment);
        if frontmost.as_deref() == Some(exp_id) {
            *frontmost = self.newest();
        }
        removed
    }

    /// Ids come from [`Experiments::next_id`], so the largest is the newest.
    fn newest(&self) -> Option<String> {
        self.entries
            .iter()
            .map(|entry| entry.key().clone())
            .max_by_key(|id| id.parse::<u64>().unwrap_or(0))
    }

    /// The most recently loaded experiment that is still registered.
    pub fn frontmost(&self) -> Option<Arc<Experiment>> {
        let id = self.frontmost.read().clone()?;
        self.get(&id)
    }

    /// Remove and return every experiment. Loads still in flight become
    /// stale and will not register.
    pub fn drain(&self) -> Vec<Arc<Experiment>> {
        {
            let _frontmost = self.frontmost.write();
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        let ids: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Holds the loading slot of an [`Experiments`] registry.
pub struct LoadingGuard {
    registry: Arc<Experiments>,
}

impl LoadingGuard {
    /// Record the id this load reserved.
    pub fn assign(&self, exp_id: &str) {
        *self.registry.loading_id.lock() = Some(exp_id.to_owned());
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        *self.registry.loading_id.lock() = None;
        self.registry.loading.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
