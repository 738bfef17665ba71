// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job store seam.
//!
//! The queue records jobs through this trait. The default implementation
//! is a mutex-guarded in-memory map; durability across restarts is a
//! non-goal, so nothing here touches disk.

use indexmap::IndexMap;
use parking_lot::Mutex;
use pulse_core::{Job, RunId};

pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job);

    fn get(&self, id: &str) -> Option<Job>;

    /// Apply a mutation under the store lock; returns the updated record.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Job)) -> Option<Job>;

    /// Drop a record, returning it if present.
    fn remove(&self, id: &str) -> Option<Job>;

    /// All jobs in insertion order.
    fn list(&self) -> Vec<Job>;
}

/// In-memory store; insertion order doubles as submission order.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<IndexMap<RunId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) {
        self.jobs.lock().insert(job.id, job);
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.jobs.lock().get(id).cloned()
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Job)) -> Option<Job> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(id)?;
        f(job);
        Some(job.clone())
    }

    fn remove(&self, id: &str) -> Option<Job> {
        self.jobs.lock().shift_remove(id)
    }

    fn list(&self) -> Vec<Job> {
        self.jobs.lock().values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
