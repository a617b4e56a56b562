//! Concurrency Gate: single-flight lock plus a FIFO queue of rescore jobs.
//!
//! Jobs run strictly in enqueue order, one at a time. A second drain attempted while one
//! is active fails with `RescoreBusy` instead of waiting; the active drain keeps popping
//! until the queue is empty, so anything enqueued meanwhile is still processed.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use crate::improvements::error::{ErrorDetail, ImprovementError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RescoreJob {
    pub id: String,
    pub updated_text: String,
    pub baseline_score: f64,
    pub previous_missing_skills: Vec<String>,
}

/// What the drain handler did with one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Applied { id: String, delta: f64 },
    /// Carries the `RescoreFailed` detail; the text edit stays applied.
    Failed { id: String, error: ErrorDetail },
    /// Result parked until a revert of the same suggestion settles.
    Held { id: String },
    /// The suggestion moved on (e.g. reverted) while the job was running.
    Discarded { id: String },
}

impl JobOutcome {
    pub fn id(&self) -> &str {
        match self {
            JobOutcome::Applied { id, .. }
            | JobOutcome::Failed { id, .. }
            | JobOutcome::Held { id }
            | JobOutcome::Discarded { id } => id,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct DrainReport {
    pub outcomes: Vec<JobOutcome>,
}

#[derive(Default)]
struct GateState {
    queue: VecDeque<RescoreJob>,
    busy: bool,
}

/// Owned per orchestrator instance, never global.
#[derive(Default)]
pub struct ConcurrencyGate {
    state: Mutex<GateState>,
}

/// Held for the duration of a drain; releases the lock when dropped.
pub struct DrainPermit<'a> {
    gate: &'a ConcurrencyGate,
}

impl DrainPermit<'_> {
    fn next_job(&self) -> Option<RescoreJob> {
        self.gate.state().queue.pop_front()
    }
}

impl Drop for DrainPermit<'_> {
    fn drop(&mut self) {
        self.gate.state().busy = false;
        debug!("Rescore gate released");
    }
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a job. Does not start processing.
    pub fn enqueue(&self, job: RescoreJob) {
        let mut state = self.state();
        debug!("Queued rescore for {} (queue depth {})", job.id, state.queue.len() + 1);
        state.queue.push_back(job);
    }

    /// Drops every not-yet-started job for `id`. A job already executing is unaffected.
    pub fn remove_queued(&self, id: &str) -> usize {
        let mut state = self.state();
        let before = state.queue.len();
        state.queue.retain(|job| job.id != id);
        before - state.queue.len()
    }

    pub fn queued_ids(&self) -> Vec<String> {
        self.state().queue.iter().map(|job| job.id.clone()).collect()
    }

    pub fn is_busy(&self) -> bool {
        self.state().busy
    }

    pub fn try_acquire(&self) -> Result<DrainPermit<'_>, ImprovementError> {
        let mut state = self.state();
        if state.busy {
            return Err(ImprovementError::RescoreBusy);
        }
        state.busy = true;
        Ok(DrainPermit { gate: self })
    }

    /// Processes queued jobs in order until the queue is empty.
    ///
    /// Each job is popped before `handler` runs, so a failed job is never retried here;
    /// the handler records failure on the suggestion and the drain moves on.
    pub async fn drain<F, Fut>(&self, mut handler: F) -> Result<DrainReport, ImprovementError>
    where
        F: FnMut(RescoreJob) -> Fut,
        Fut: Future<Output = JobOutcome>,
    {
        let permit = self.try_acquire()?;
        let mut report = DrainReport::default();

        while let Some(job) = permit.next_job() {
            let id = job.id.clone();
            debug!("Rescore job {id} started");
            let outcome = handler(job).await;
            debug!("Rescore job {id} finished: {outcome:?}");
            report.outcomes.push(outcome);
        }

        if !report.outcomes.is_empty() {
            info!("Rescore drain processed {} job(s)", report.outcomes.len());
        }
        Ok(report)
    }
}
