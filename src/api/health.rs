//! Shared health state for the /health endpoint.
//! Updated by the job registry as jobs start and finish.

use std::sync::atomic::{AtomicU64, Ordering};

/// Job counters. Written by `JobRegistry`, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// Jobs currently running.
    pub active_jobs: AtomicU64,
    pub jobs_started: AtomicU64,
    /// Jobs that ended with an error instead of a summary.
    pub jobs_failed: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
        self.active_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_finished(&self) {
        let _ = self
            .active_jobs
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_jobs(&self) -> u64 {
        self.active_jobs.load(Ordering::Relaxed)
    }

    pub fn jobs_started(&self) -> u64 {
        self.jobs_started.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }
}
