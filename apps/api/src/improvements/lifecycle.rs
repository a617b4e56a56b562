//! Suggestion Lifecycle: accept / reject / revert over AI-proposed resume edits.
//!
//! Flow (accept): validate → snapshot → apply text + optimistic log insert → persist log
//!                → enqueue rescore → drain gate.
//!
//! All in-memory transitions happen under a short, synchronous lock that is never held
//! across an `.await`; suspension happens only at the scorer and the change log store.
//!
//! Partial-failure policy:
//! - a failed change log write rolls back the log insert but NOT the applied text; calling
//!   accept again re-persists the entry and rescores without taking a new snapshot;
//! - a failed rescore leaves the text applied and records the error on the suggestion;
//! - a rescore that lands while a revert write is pending is held, then applied if that
//!   revert fails or dropped if it succeeds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::improvements::categorize::build_entry;
use crate::improvements::error::{ErrorDetail, ImprovementError, Phase};
use crate::improvements::gate::{ConcurrencyGate, DrainReport, JobOutcome, RescoreJob};
use crate::improvements::history::{SnapshotInfo, VersionedHistoryStore};
use crate::improvements::models::{
    AcceptanceState, ChangeLogEntry, DocumentState, ImprovementSuggestion, JobContext,
    ResumeHistorySnapshot, RescoreSummary,
};
use crate::improvements::persistence::ChangeLogPersistenceAdapter;
use crate::improvements::rescore::{RescoreRequest, Rescorer};
use crate::improvements::summary::{build_aggregated_summary, AggregatedSummary};

const DEFAULT_VALIDATION_REASON: &str = "Suggestion does not align with the job description";

// ────────────────────────────────────────────────────────────────────────────
// Outcomes and projections
// ────────────────────────────────────────────────────────────────────────────

/// Rescore result as seen by the caller of `accept`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RescoreStatus {
    Completed { delta: f64 },
    /// Text stays applied; only the score refresh is missing.
    Failed { error: ErrorDetail },
    /// Another drain is running and will pick up the queued job.
    Deferred,
    /// A revert was in flight; the result lands only if that revert fails.
    Held,
    /// The suggestion was reverted before its rescore finished.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptOutcome {
    pub id: String,
    pub rescore: RescoreStatus,
}

#[derive(Debug, Default)]
pub struct AcceptAllReport {
    pub accepted: Vec<AcceptOutcome>,
    /// First hard failure; suggestions after it were left untouched.
    pub halted: Option<ImprovementError>,
}

/// Read-only projection handed to the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub job_id: Uuid,
    pub document: DocumentState,
    pub suggestions: Vec<ImprovementSuggestion>,
    pub change_log: Vec<ChangeLogEntry>,
    pub summary: AggregatedSummary,
    pub queued_rescores: Vec<String>,
    pub rescore_busy: bool,
}

/// Initial state for a lifecycle manager.
pub struct SessionSeed {
    pub job_context: JobContext,
    pub document: DocumentState,
    pub suggestions: Vec<ImprovementSuggestion>,
    pub change_log: Vec<ChangeLogEntry>,
}

// ────────────────────────────────────────────────────────────────────────────
// Manager
// ────────────────────────────────────────────────────────────────────────────

struct SessionState {
    suggestions: Vec<ImprovementSuggestion>,
    document: DocumentState,
    change_log: Vec<ChangeLogEntry>,
    history: VersionedHistoryStore,
    /// Suggestions whose revert write is in flight.
    reverting: HashSet<String>,
    held_rescores: HashMap<String, (RescoreJob, RescoreSummary)>,
}

impl SessionState {
    fn position(&self, id: &str, phase: Phase) -> Result<usize, ImprovementError> {
        self.suggestions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| ImprovementError::SuggestionNotFound {
                id: id.to_string(),
                phase,
            })
    }

    /// Accepted with a snapshot on file but no change log entry: the accept's log write
    /// failed and can be retried.
    fn audit_missing(&self, id: &str) -> bool {
        self.history.contains(id)
            && !self.reverting.contains(id)
            && !self.change_log.iter().any(|e| e.id == id)
            && self
                .suggestions
                .iter()
                .any(|s| s.id == id && s.acceptance == AcceptanceState::Accepted)
    }

    fn suggestion_mut(&mut self, id: &str) -> Option<&mut ImprovementSuggestion> {
        self.suggestions.iter_mut().find(|s| s.id == id)
    }

    fn upsert_log_entry(&mut self, entry: ChangeLogEntry) {
        match self.change_log.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.change_log.push(entry),
        }
    }
}

struct Inner {
    job_context: JobContext,
    state: Mutex<SessionState>,
    gate: Arc<ConcurrencyGate>,
    rescorer: Arc<dyn Rescorer>,
    persistence: ChangeLogPersistenceAdapter,
}

/// Sole owner of the suggestion list, the current document and the local change log
/// cache. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SuggestionLifecycleManager {
    inner: Arc<Inner>,
}

impl SuggestionLifecycleManager {
    pub fn new(
        seed: SessionSeed,
        rescorer: Arc<dyn Rescorer>,
        persistence: ChangeLogPersistenceAdapter,
        gate: Arc<ConcurrencyGate>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                job_context: seed.job_context,
                state: Mutex::new(SessionState {
                    suggestions: seed.suggestions,
                    document: seed.document,
                    change_log: seed.change_log,
                    history: VersionedHistoryStore::new(),
                    reverting: HashSet::new(),
                    held_rescores: HashMap::new(),
                }),
                gate,
                rescorer,
                persistence,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn job_id(&self) -> Uuid {
        self.inner.persistence.job_id()
    }

    // ── Accept ──

    /// Applies an undecided suggestion, records it in the change log and rescores.
    ///
    /// Also the retry path for an accept whose change log write failed: the applied text
    /// and snapshot are kept, and only the entry write and rescore are redone.
    pub async fn accept(&self, id: &str) -> Result<AcceptOutcome, ImprovementError> {
        let (entry, job) = {
            let mut state = self.state();
            let idx = state.position(id, Phase::Accept)?;
            let resuming = state.audit_missing(id);
            let suggestion = &state.suggestions[idx];

            if suggestion.acceptance != AcceptanceState::Undecided && !resuming {
                return Err(ImprovementError::InvalidTransition {
                    id: id.to_string(),
                    phase: Phase::Accept,
                    state: suggestion.acceptance,
                });
            }
            if !resuming && suggestion.validation_failed() {
                let reason = suggestion
                    .validation
                    .as_ref()
                    .and_then(|v| v.reason.clone())
                    .unwrap_or_else(|| DEFAULT_VALIDATION_REASON.to_string());
                return Err(ImprovementError::ValidationRejected {
                    id: id.to_string(),
                    reason,
                });
            }

            let job = RescoreJob {
                id: id.to_string(),
                updated_text: suggestion.updated_text.clone(),
                baseline_score: state.document.overall_score(),
                previous_missing_skills: state.document.missing_skills(),
            };
            let entry = build_entry(suggestion, Utc::now());

            if resuming {
                info!("Retrying change log write for accepted suggestion {id}");
            } else {
                let snapshot = ResumeHistorySnapshot {
                    document: state.document.clone(),
                    change_log: state.change_log.clone(),
                };
                if state.history.contains(id) {
                    warn!("Overwriting existing snapshot for {id}");
                }
                let version = state.history.save(id, &snapshot);
                state.document.text = job.updated_text.clone();
                info!(
                    "Accepted suggestion {id} for job {} (snapshot v{version}, {:?})",
                    self.job_id(),
                    entry.label
                );
            }

            let suggestion = &mut state.suggestions[idx];
            suggestion.acceptance = AcceptanceState::Accepted;
            suggestion.rescore_pending = true;
            suggestion.rescore_error = None;
            suggestion.score_delta = None;
            state.upsert_log_entry(entry.clone());
            (entry, job)
        };

        match self.inner.persistence.write(&entry, Phase::Accept).await {
            Ok(log) => self.state().change_log = log,
            Err(e) => {
                // The edit stands; only its audit record is rolled back. Accepting again
                // retries the write.
                warn!("Change log write for {id} failed, edit kept: {e}");
                let mut state = self.state();
                state.change_log.retain(|existing| existing.id != entry.id);
                if let Some(suggestion) = state.suggestion_mut(id) {
                    suggestion.rescore_pending = false;
                }
                return Err(e);
            }
        }

        self.inner.gate.enqueue(job);

        let rescore = match self.drain_rescores().await {
            Ok(report) => report
                .outcomes
                .into_iter()
                .find(|outcome| outcome.id() == id)
                .map(RescoreStatus::from)
                .unwrap_or(RescoreStatus::Deferred),
            Err(ImprovementError::RescoreBusy) => {
                debug!("Rescore for {id} deferred to the active drain");
                RescoreStatus::Deferred
            }
            Err(e) => return Err(e),
        };

        Ok(AcceptOutcome {
            id: id.to_string(),
            rescore,
        })
    }

    /// Accepts every undecided suggestion in order, one at a time, stopping at the first
    /// hard failure. Each accept's rescore drains before the next snapshot is taken.
    pub async fn accept_all(&self) -> AcceptAllReport {
        let pending: Vec<String> = self
            .state()
            .suggestions
            .iter()
            .filter(|s| s.acceptance == AcceptanceState::Undecided)
            .map(|s| s.id.clone())
            .collect();

        let mut report = AcceptAllReport::default();
        for id in pending {
            let still_undecided = self
                .suggestion(&id)
                .is_some_and(|s| s.acceptance == AcceptanceState::Undecided);
            if !still_undecided {
                continue;
            }
            match self.accept(&id).await {
                Ok(outcome) => report.accepted.push(outcome),
                Err(e) => {
                    warn!("Accept-all halted at {id}: {e}");
                    report.halted = Some(e);
                    break;
                }
            }
        }
        report
    }

    // ── Reject / revert ──

    /// Rejects a suggestion. Never-accepted suggestions just flip state; accepted ones
    /// are reverted first.
    pub async fn reject(&self, id: &str) -> Result<(), ImprovementError> {
        {
            let mut state = self.state();
            let idx = state.position(id, Phase::Reject)?;
            let suggestion = &mut state.suggestions[idx];
            match suggestion.acceptance {
                AcceptanceState::Undecided => {
                    suggestion.acceptance = AcceptanceState::Rejected;
                    info!("Rejected suggestion {id}");
                    return Ok(());
                }
                AcceptanceState::Rejected => return Ok(()),
                AcceptanceState::Accepted => {}
            }
        }

        self.revert(id).await?;
        if let Some(suggestion) = self.state().suggestion_mut(id) {
            suggestion.acceptance = AcceptanceState::Rejected;
        }
        Ok(())
    }

    /// Restores the pre-accept snapshot for `id` and flags its change log entry reverted.
    ///
    /// Local state changes only after the reverted entry is persisted, so a failed revert
    /// leaves no partial restore behind. Rescores finishing meanwhile are held.
    pub async fn revert(&self, id: &str) -> Result<(), ImprovementError> {
        let (snapshot, reverted_entry) = {
            let mut state = self.state();
            let idx = state.position(id, Phase::Revert)?;
            let acceptance = state.suggestions[idx].acceptance;
            if acceptance != AcceptanceState::Accepted || state.reverting.contains(id) {
                return Err(ImprovementError::InvalidTransition {
                    id: id.to_string(),
                    phase: Phase::Revert,
                    state: acceptance,
                });
            }
            let snapshot = state.history.restore(id)?;

            let reverted_entry = state
                .change_log
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .map(|mut entry| {
                    entry.reverted = true;
                    entry.reverted_at = Some(Utc::now());
                    entry
                });
            state.reverting.insert(id.to_string());
            (snapshot, reverted_entry)
        };

        let log = match &reverted_entry {
            Some(entry) => match self.inner.persistence.write(entry, Phase::Revert).await {
                Ok(log) => Some(log),
                Err(e) => {
                    let held = {
                        let mut state = self.state();
                        state.reverting.remove(id);
                        state.held_rescores.remove(id)
                    };
                    if let Some((job, summary)) = held {
                        debug!("Revert of {id} failed; applying held rescore");
                        self.apply_rescore(&job, summary).await;
                    }
                    return Err(e);
                }
            },
            None => {
                warn!("Reverting {id} without a change log entry; nothing to flag");
                None
            }
        };

        let dropped = self.inner.gate.remove_queued(id);
        let mut state = self.state();
        state.reverting.remove(id);
        if state.held_rescores.remove(id).is_some() {
            debug!("Dropping held rescore for reverted {id}");
        }
        if let Some(log) = log {
            state.change_log = log;
        }
        state.document = snapshot.document;
        state.history.retire(id);
        if let Some(suggestion) = state.suggestion_mut(id) {
            suggestion.acceptance = AcceptanceState::Rejected;
            suggestion.score_delta = None;
            suggestion.rescore_pending = false;
            suggestion.rescore_error = None;
        }
        info!(
            "Reverted suggestion {id} for job {} ({dropped} queued rescore(s) dropped)",
            self.job_id()
        );
        Ok(())
    }

    /// Dismisses a reverted change log entry from the store. Live entries cannot be
    /// removed; the audit trail is mark-only until an edit has been undone.
    pub async fn remove_log_entry(&self, entry_id: &str) -> Result<(), ImprovementError> {
        let (position, removed) = {
            let mut state = self.state();
            let position = state
                .change_log
                .iter()
                .position(|e| e.id == entry_id)
                .ok_or_else(|| ImprovementError::SuggestionNotFound {
                    id: entry_id.to_string(),
                    phase: Phase::Remove,
                })?;
            if !state.change_log[position].reverted {
                return Err(ImprovementError::InvalidTransition {
                    id: entry_id.to_string(),
                    phase: Phase::Remove,
                    state: AcceptanceState::Accepted,
                });
            }
            (position, state.change_log.remove(position))
        };

        match self.inner.persistence.remove(entry_id).await {
            Ok(log) => {
                let mut state = self.state();
                state.change_log = log;
                state.history.forget(entry_id);
                info!("Removed reverted change log entry {entry_id}");
                Ok(())
            }
            Err(e) => {
                let mut state = self.state();
                let position = position.min(state.change_log.len());
                state.change_log.insert(position, removed);
                Err(e)
            }
        }
    }

    // ── Rescore ──

    /// Drains the rescore queue. Fails with `RescoreBusy` if a drain is already running.
    pub async fn drain_rescores(&self) -> Result<DrainReport, ImprovementError> {
        self.inner.gate.drain(|job| self.run_rescore(job)).await
    }

    async fn run_rescore(&self, job: RescoreJob) -> JobOutcome {
        let request = RescoreRequest {
            document_text: &job.updated_text,
            job_context: &self.inner.job_context,
            baseline_score: job.baseline_score,
            previous_missing_skills: &job.previous_missing_skills,
        };

        match self.inner.rescorer.rescore(&request).await {
            Ok(summary) => self.apply_rescore(&job, summary).await,
            Err(e) => {
                let error = ImprovementError::RescoreFailed {
                    id: job.id.clone(),
                    message: e.to_string(),
                };
                warn!("{error}");
                if let Some(suggestion) = self.state().suggestion_mut(&job.id) {
                    suggestion.rescore_pending = false;
                    if suggestion.acceptance == AcceptanceState::Accepted {
                        suggestion.rescore_error = Some(e.to_string());
                    }
                }
                JobOutcome::Failed {
                    id: job.id,
                    error: error.detail(),
                }
            }
        }
    }

    async fn apply_rescore(&self, job: &RescoreJob, summary: RescoreSummary) -> JobOutcome {
        let delta = summary.delta_from(job.baseline_score);

        let entry = {
            let mut state = self.state();
            if state.reverting.contains(&job.id) {
                debug!("Holding rescore for {} until its revert settles", job.id);
                state
                    .held_rescores
                    .insert(job.id.clone(), (job.clone(), summary));
                return JobOutcome::Held { id: job.id.clone() };
            }
            let Some(suggestion) = state.suggestion_mut(&job.id) else {
                return JobOutcome::Discarded { id: job.id.clone() };
            };
            if suggestion.acceptance != AcceptanceState::Accepted {
                suggestion.rescore_pending = false;
                debug!("Discarding rescore for {}: suggestion moved on", job.id);
                return JobOutcome::Discarded { id: job.id.clone() };
            }

            suggestion.score_delta = Some(delta);
            suggestion.rescore_pending = false;
            suggestion.rescore_error = None;
            suggestion.rescore_summary = Some(summary.clone());

            // Only adopt the oracle's view if it scored the text still in place.
            if state.document.text == job.updated_text {
                state.document.match_result = Some(summary.to_match_result());
                state.document.score_breakdown = summary.score_breakdown;
            }

            state
                .change_log
                .iter_mut()
                .find(|e| e.id == job.id)
                .map(|entry| {
                    entry.score_delta = Some(delta);
                    entry.clone()
                })
        };

        info!("Rescored {}: delta {delta:+}", job.id);

        if let Some(entry) = entry {
            match self.inner.persistence.write(&entry, Phase::Rescore).await {
                Ok(log) => self.state().change_log = log,
                Err(e) => {
                    warn!("Score delta for {} kept locally only: {e}", job.id);
                    if let Some(suggestion) = self.state().suggestion_mut(&job.id) {
                        suggestion.rescore_error = Some(e.to_string());
                    }
                }
            }
        }

        JobOutcome::Applied {
            id: job.id.clone(),
            delta,
        }
    }

    // ── Projections ──

    pub fn suggestion(&self, id: &str) -> Option<ImprovementSuggestion> {
        self.state().suggestions.iter().find(|s| s.id == id).cloned()
    }

    pub fn document(&self) -> DocumentState {
        self.state().document.clone()
    }

    pub fn change_log(&self) -> Vec<ChangeLogEntry> {
        self.state().change_log.clone()
    }

    pub fn summary(&self) -> AggregatedSummary {
        build_aggregated_summary(&self.state().change_log)
    }

    pub fn history(&self) -> Vec<SnapshotInfo> {
        self.state().history.list()
    }

    pub fn view(&self) -> SessionView {
        let (document, suggestions, change_log) = {
            let state = self.state();
            (
                state.document.clone(),
                state.suggestions.clone(),
                state.change_log.clone(),
            )
        };
        SessionView {
            job_id: self.job_id(),
            summary: build_aggregated_summary(&change_log),
            document,
            suggestions,
            change_log,
            queued_rescores: self.inner.gate.queued_ids(),
            rescore_busy: self.inner.gate.is_busy(),
        }
    }
}

impl From<JobOutcome> for RescoreStatus {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Applied { delta, .. } => RescoreStatus::Completed { delta },
            JobOutcome::Failed { error, .. } => RescoreStatus::Failed { error },
            JobOutcome::Held { .. } => RescoreStatus::Held,
            JobOutcome::Discarded { .. } => RescoreStatus::Discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::improvements::models::{
        ChangeType, MatchResult, ScoreBreakdownItem, SelectionProbability, SuggestionType,
        ValidationStatus, ValidationVerdict,
    };
    use crate::improvements::persistence::memory::MemoryChangeLogStore;
    use crate::improvements::persistence::{ChangeLogStore, StoreError};
    use crate::improvements::rescore::RescoreError;

    // ── Fakes ──

    /// Returns scripted results in order and records start/end of every call.
    #[derive(Default)]
    struct ScriptedRescorer {
        results: Mutex<VecDeque<Result<RescoreSummary, String>>>,
        events: Mutex<Vec<String>>,
    }

    impl ScriptedRescorer {
        fn push_ok(&self, overall: f64, delta: Option<f64>) {
            self.results
                .lock()
                .unwrap()
                .push_back(Ok(summary(overall, delta)));
        }

        fn push_err(&self, message: &str) {
            self.results
                .lock()
                .unwrap()
                .push_back(Err(message.to_string()));
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Rescorer for ScriptedRescorer {
        async fn rescore(
            &self,
            request: &RescoreRequest<'_>,
        ) -> Result<RescoreSummary, RescoreError> {
            self.events
                .lock()
                .unwrap()
                .push(format!("start:{}", request.document_text));
            tokio::task::yield_now().await;
            self.events
                .lock()
                .unwrap()
                .push(format!("end:{}", request.document_text));
            let next = self.results.lock().unwrap().pop_front();
            match next {
                Some(Ok(summary)) => Ok(summary),
                Some(Err(message)) => Err(RescoreError::Scoring(message)),
                None => Ok(summary(request.baseline_score, Some(0.0))),
            }
        }
    }

    /// Blocks inside `rescore` until released, to observe a job mid-flight.
    #[derive(Default)]
    struct GatedRescorer {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Rescorer for GatedRescorer {
        async fn rescore(
            &self,
            _request: &RescoreRequest<'_>,
        ) -> Result<RescoreSummary, RescoreError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(summary(90.0, Some(30.0)))
        }
    }

    /// In-memory store whose next armed write parks until released, then fails.
    #[derive(Default)]
    struct StallingStore {
        inner: MemoryChangeLogStore,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ChangeLogStore for StallingStore {
        async fn write(
            &self,
            job_id: Uuid,
            entry: &ChangeLogEntry,
        ) -> Result<Vec<ChangeLogEntry>, StoreError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
                return Err(StoreError::Rejected("store unavailable".to_string()));
            }
            self.inner.write(job_id, entry).await
        }

        async fn remove(
            &self,
            job_id: Uuid,
            entry_id: &str,
        ) -> Result<Vec<ChangeLogEntry>, StoreError> {
            self.inner.remove(job_id, entry_id).await
        }

        async fn list(&self, job_id: Uuid) -> Result<Vec<ChangeLogEntry>, StoreError> {
            self.inner.list(job_id).await
        }
    }

    // ── Fixtures ──

    fn summary(overall: f64, delta: Option<f64>) -> RescoreSummary {
        RescoreSummary {
            overall_score: overall,
            score_breakdown: vec![ScoreBreakdownItem {
                category: "keyword_coverage".to_string(),
                score: overall,
                max_score: 100.0,
            }],
            covered_skills: vec!["Rust".to_string(), "Kubernetes".to_string()],
            missing_skills: vec![],
            selection_probability: SelectionProbability {
                before: 0.5,
                after: 0.6,
                factors: vec!["Now covers Kubernetes".to_string()],
            },
            delta,
        }
    }

    fn original_document() -> DocumentState {
        DocumentState {
            text: "Original resume".to_string(),
            match_result: Some(MatchResult {
                overall_score: 60.0,
                covered_skills: vec!["Rust".to_string()],
                missing_skills: vec!["Kubernetes".to_string()],
                selection_probability: Some(SelectionProbability {
                    before: 0.4,
                    after: 0.5,
                    factors: vec![],
                }),
            }),
            score_breakdown: vec![ScoreBreakdownItem {
                category: "keyword_coverage".to_string(),
                score: 60.0,
                max_score: 100.0,
            }],
            skills: vec!["Rust".to_string(), "SQL".to_string()],
        }
    }

    fn suggestion(id: &str, kind: SuggestionType, before: &str, after: &str) -> ImprovementSuggestion {
        ImprovementSuggestion {
            id: id.to_string(),
            suggestion_type: kind,
            title: format!("Suggestion {id}"),
            before_excerpt: before.to_string(),
            after_excerpt: after.to_string(),
            updated_text: format!("resume after {id}"),
            confidence: 0.9,
            acceptance: AcceptanceState::Undecided,
            validation: None,
            segments: vec![],
            explanation: None,
            rescore_summary: None,
            score_delta: None,
            rescore_pending: false,
            rescore_error: None,
        }
    }

    fn s1() -> ImprovementSuggestion {
        suggestion("s1", SuggestionType::Skills, "", "Added: Kubernetes")
    }

    struct Harness {
        manager: SuggestionLifecycleManager,
        store: Arc<MemoryChangeLogStore>,
        job_id: Uuid,
    }

    fn harness_with(
        suggestions: Vec<ImprovementSuggestion>,
        rescorer: Arc<dyn Rescorer>,
    ) -> Harness {
        let store = Arc::new(MemoryChangeLogStore::default());
        let job_id = Uuid::new_v4();
        let manager = SuggestionLifecycleManager::new(
            SessionSeed {
                job_context: JobContext::default(),
                document: original_document(),
                suggestions,
                change_log: vec![],
            },
            rescorer,
            ChangeLogPersistenceAdapter::new(store.clone(), job_id),
            Arc::new(ConcurrencyGate::new()),
        );
        Harness {
            manager,
            store,
            job_id,
        }
    }

    // ── Accept ──

    #[tokio::test]
    async fn test_accept_records_entry_and_score_delta() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_ok(64.0, Some(4.0));
        let h = harness_with(vec![s1()], rescorer);

        let outcome = h.manager.accept("s1").await.unwrap();
        assert_eq!(outcome.rescore, RescoreStatus::Completed { delta: 4.0 });

        let s = h.manager.suggestion("s1").unwrap();
        assert_eq!(s.acceptance, AcceptanceState::Accepted);
        assert_eq!(s.score_delta, Some(4.0));
        assert!(!s.rescore_pending);
        assert_eq!(h.manager.document().text, "resume after s1");

        let persisted = h.store.entries(h.job_id);
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].label, ChangeType::Added);
        assert_eq!(persisted[0].categories[0].key, "skills");
        assert_eq!(persisted[0].categories[0].added, vec!["Kubernetes"]);
        assert_eq!(persisted[0].score_delta, Some(4.0));
        assert_eq!(h.manager.change_log(), persisted);
    }

    #[tokio::test]
    async fn test_local_delta_used_when_oracle_omits_it() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_ok(72.0, None);
        let h = harness_with(vec![s1()], rescorer);

        h.manager.accept("s1").await.unwrap();
        assert_eq!(h.manager.suggestion("s1").unwrap().score_delta, Some(12.0));
        assert_eq!(h.manager.document().overall_score(), 72.0);
    }

    #[tokio::test]
    async fn test_accept_then_revert_restores_state_exactly() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_ok(80.0, Some(20.0));
        let h = harness_with(vec![s1()], rescorer);

        h.manager.accept("s1").await.unwrap();
        assert_ne!(h.manager.document(), original_document());

        h.manager.revert("s1").await.unwrap();
        assert_eq!(h.manager.document(), original_document());

        let s = h.manager.suggestion("s1").unwrap();
        assert_eq!(s.acceptance, AcceptanceState::Rejected);
        assert_eq!(s.score_delta, None);
        assert!(!s.rescore_pending);

        let persisted = h.store.entries(h.job_id);
        assert!(persisted[0].reverted);
        assert!(persisted[0].reverted_at.is_some());
        assert!(h.manager.change_log()[0].reverted);
        assert!(h.manager.history()[0].retired);
    }

    #[tokio::test]
    async fn test_validation_failure_blocks_accept() {
        let mut s = s1();
        s.validation = Some(ValidationVerdict {
            status: ValidationStatus::Failed,
            matched_keywords: vec![],
            reason: Some("Kubernetes is not in your source resume".to_string()),
        });
        let h = harness_with(vec![s], Arc::new(ScriptedRescorer::default()));

        let err = h.manager.accept("s1").await.unwrap_err();
        assert!(matches!(
            err,
            ImprovementError::ValidationRejected { ref reason, .. }
                if reason == "Kubernetes is not in your source resume"
        ));
        assert_eq!(
            h.manager.suggestion("s1").unwrap().acceptance,
            AcceptanceState::Undecided
        );
        assert_eq!(h.manager.document(), original_document());
        assert!(h.manager.history().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_text_but_drops_log_entry() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        let h = harness_with(vec![s1()], rescorer.clone());
        h.store.set_fail_writes(true);

        let err = h.manager.accept("s1").await.unwrap_err();
        assert!(matches!(
            err,
            ImprovementError::PersistenceFailed { phase: Phase::Accept, .. }
        ));
        assert!(err.is_retryable());

        assert_eq!(h.manager.document().text, "resume after s1");
        assert!(h.manager.change_log().is_empty());
        let s = h.manager.suggestion("s1").unwrap();
        assert_eq!(s.acceptance, AcceptanceState::Accepted);
        assert!(!s.rescore_pending);
        assert!(rescorer.events().is_empty());
    }

    #[tokio::test]
    async fn test_accept_retry_after_log_failure_persists_and_rescores() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_ok(64.0, Some(4.0));
        let h = harness_with(vec![s1()], rescorer.clone());
        h.store.set_fail_writes(true);

        let err = h.manager.accept("s1").await.unwrap_err();
        assert!(err.is_retryable());
        let version = h.manager.history()[0].version;

        h.store.set_fail_writes(false);
        let outcome = h.manager.accept("s1").await.unwrap();
        assert_eq!(outcome.rescore, RescoreStatus::Completed { delta: 4.0 });

        let persisted = h.store.entries(h.job_id);
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, "s1");
        assert_eq!(persisted[0].score_delta, Some(4.0));
        assert_eq!(h.manager.suggestion("s1").unwrap().score_delta, Some(4.0));
        assert_eq!(rescorer.events().len(), 2);

        // The retry reused the original snapshot.
        assert_eq!(h.manager.history().len(), 1);
        assert_eq!(h.manager.history()[0].version, version);
        h.manager.revert("s1").await.unwrap();
        assert_eq!(h.manager.document(), original_document());

        assert!(matches!(
            h.manager.accept("s1").await,
            Err(ImprovementError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_rescore_failure_is_partial_success() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_err("scoring service unavailable");
        let h = harness_with(vec![s1()], rescorer);

        let outcome = h.manager.accept("s1").await.unwrap();
        assert!(matches!(
            &outcome.rescore,
            RescoreStatus::Failed { error }
                if error.code == "RESCORE_FAILED"
                    && error.phase == Phase::Rescore
                    && error.suggestion_id.as_deref() == Some("s1")
        ));

        let s = h.manager.suggestion("s1").unwrap();
        assert_eq!(s.acceptance, AcceptanceState::Accepted);
        assert_eq!(s.score_delta, None);
        assert!(!s.rescore_pending);
        assert!(s
            .rescore_error
            .unwrap()
            .contains("scoring service unavailable"));
        assert_eq!(h.manager.document().text, "resume after s1");
        assert_eq!(h.store.entries(h.job_id).len(), 1);
    }

    #[tokio::test]
    async fn test_accept_twice_is_invalid() {
        let h = harness_with(vec![s1()], Arc::new(ScriptedRescorer::default()));
        h.manager.accept("s1").await.unwrap();
        let err = h.manager.accept("s1").await.unwrap_err();
        assert!(matches!(
            err,
            ImprovementError::InvalidTransition {
                state: AcceptanceState::Accepted,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_suggestion() {
        let h = harness_with(vec![], Arc::new(ScriptedRescorer::default()));
        assert!(matches!(
            h.manager.accept("ghost").await,
            Err(ImprovementError::SuggestionNotFound { .. })
        ));
    }

    // ── Reject / revert ──

    #[tokio::test]
    async fn test_reject_undecided_is_cheap() {
        let h = harness_with(vec![s1()], Arc::new(ScriptedRescorer::default()));
        h.manager.reject("s1").await.unwrap();

        assert_eq!(
            h.manager.suggestion("s1").unwrap().acceptance,
            AcceptanceState::Rejected
        );
        assert!(h.manager.history().is_empty());
        assert!(h.manager.change_log().is_empty());
        assert!(h.store.entries(h.job_id).is_empty());

        // Rejected suggestions cannot be accepted or reverted afterwards.
        assert!(h.manager.accept("s1").await.is_err());
        assert!(matches!(
            h.manager.revert("s1").await,
            Err(ImprovementError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_reject_accepted_reverts_first() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_ok(70.0, Some(10.0));
        let h = harness_with(vec![s1()], rescorer);

        h.manager.accept("s1").await.unwrap();
        h.manager.reject("s1").await.unwrap();

        assert_eq!(h.manager.document(), original_document());
        assert_eq!(
            h.manager.suggestion("s1").unwrap().acceptance,
            AcceptanceState::Rejected
        );
        assert!(h.store.entries(h.job_id)[0].reverted);
    }

    #[tokio::test]
    async fn test_revert_without_snapshot_is_missing() {
        let h = harness_with(vec![s1()], Arc::new(ScriptedRescorer::default()));
        h.manager.accept("s1").await.unwrap();
        h.manager.inner.state.lock().unwrap().history.forget("s1");

        let err = h.manager.revert("s1").await.unwrap_err();
        assert!(matches!(err, ImprovementError::SnapshotMissing { .. }));
        assert!(!err.is_retryable());
        assert_eq!(
            h.manager.suggestion("s1").unwrap().acceptance,
            AcceptanceState::Accepted
        );
    }

    #[tokio::test]
    async fn test_failed_revert_leaves_no_partial_restore() {
        let h = harness_with(vec![s1()], Arc::new(ScriptedRescorer::default()));
        h.manager.accept("s1").await.unwrap();
        let applied = h.manager.document();
        h.store.set_fail_writes(true);

        let err = h.manager.revert("s1").await.unwrap_err();
        assert_eq!(err.phase(), Phase::Revert);
        assert_eq!(h.manager.document(), applied);
        assert!(!h.manager.change_log()[0].reverted);
        assert_eq!(
            h.manager.suggestion("s1").unwrap().acceptance,
            AcceptanceState::Accepted
        );

        h.store.set_fail_writes(false);
        h.manager.revert("s1").await.unwrap();
        assert_eq!(h.manager.document(), original_document());
    }

    #[tokio::test]
    async fn test_revert_drops_queued_rescore() {
        let h = harness_with(vec![s1()], Arc::new(ScriptedRescorer::default()));
        let permit = h.manager.inner.gate.try_acquire().unwrap();

        let outcome = h.manager.accept("s1").await.unwrap();
        assert_eq!(outcome.rescore, RescoreStatus::Deferred);
        assert_eq!(h.manager.view().queued_rescores, vec!["s1"]);
        assert!(h.manager.suggestion("s1").unwrap().rescore_pending);

        h.manager.revert("s1").await.unwrap();
        assert!(h.manager.view().queued_rescores.is_empty());
        assert!(!h.manager.suggestion("s1").unwrap().rescore_pending);
        drop(permit);
    }

    #[tokio::test]
    async fn test_in_flight_rescore_result_ignored_after_revert() {
        let rescorer = Arc::new(GatedRescorer::default());
        let h = harness_with(vec![s1()], rescorer.clone());

        let manager = h.manager.clone();
        let accept = tokio::spawn(async move { manager.accept("s1").await });

        rescorer.started.notified().await;
        h.manager.revert("s1").await.unwrap();
        rescorer.release.notify_one();

        let outcome = accept.await.unwrap().unwrap();
        assert_eq!(outcome.rescore, RescoreStatus::Discarded);

        let s = h.manager.suggestion("s1").unwrap();
        assert_eq!(s.score_delta, None);
        assert_eq!(s.acceptance, AcceptanceState::Rejected);
        assert_eq!(h.manager.document(), original_document());
        assert_eq!(h.store.entries(h.job_id)[0].score_delta, None);
    }

    #[tokio::test]
    async fn test_rescore_during_failed_revert_is_applied_afterwards() {
        let rescorer = Arc::new(GatedRescorer::default());
        let store = Arc::new(StallingStore::default());
        let job_id = Uuid::new_v4();
        let manager = SuggestionLifecycleManager::new(
            SessionSeed {
                job_context: JobContext::default(),
                document: original_document(),
                suggestions: vec![s1()],
                change_log: vec![],
            },
            rescorer.clone(),
            ChangeLogPersistenceAdapter::new(store.clone(), job_id),
            Arc::new(ConcurrencyGate::new()),
        );

        let accepting = manager.clone();
        let accept = tokio::spawn(async move { accepting.accept("s1").await });
        rescorer.started.notified().await;

        store.armed.store(true, Ordering::SeqCst);
        let reverting = manager.clone();
        let revert = tokio::spawn(async move { reverting.revert("s1").await });
        store.entered.notified().await;

        // Nothing reads as reverted while the write is pending.
        assert!(!manager.change_log()[0].reverted);
        assert_eq!(manager.document().text, "resume after s1");
        assert!(matches!(
            manager.revert("s1").await,
            Err(ImprovementError::InvalidTransition { .. })
        ));

        rescorer.release.notify_one();
        let outcome = accept.await.unwrap().unwrap();
        assert_eq!(outcome.rescore, RescoreStatus::Held);

        store.release.notify_one();
        let err = revert.await.unwrap().unwrap_err();
        assert_eq!(err.phase(), Phase::Revert);

        let s = manager.suggestion("s1").unwrap();
        assert_eq!(s.acceptance, AcceptanceState::Accepted);
        assert_eq!(s.score_delta, Some(30.0));
        assert!(!s.rescore_pending);
        assert_eq!(s.rescore_error, None);
        let persisted = store.inner.entries(job_id);
        assert_eq!(persisted[0].score_delta, Some(30.0));
        assert!(!persisted[0].reverted);
    }

    #[tokio::test]
    async fn test_held_rescore_is_dropped_when_revert_succeeds() {
        let rescorer = Arc::new(GatedRescorer::default());
        let store = Arc::new(StallingStore::default());
        let job_id = Uuid::new_v4();
        let manager = SuggestionLifecycleManager::new(
            SessionSeed {
                job_context: JobContext::default(),
                document: original_document(),
                suggestions: vec![s1()],
                change_log: vec![],
            },
            rescorer.clone(),
            ChangeLogPersistenceAdapter::new(store.clone(), job_id),
            Arc::new(ConcurrencyGate::new()),
        );

        let accepting = manager.clone();
        let accept = tokio::spawn(async move { accepting.accept("s1").await });
        rescorer.started.notified().await;

        // Park the rescore result behind a revert marker, then let the revert through.
        manager.state().reverting.insert("s1".to_string());
        rescorer.release.notify_one();
        assert_eq!(accept.await.unwrap().unwrap().rescore, RescoreStatus::Held);
        manager.state().reverting.remove("s1");

        manager.revert("s1").await.unwrap();
        let s = manager.suggestion("s1").unwrap();
        assert_eq!(s.acceptance, AcceptanceState::Rejected);
        assert_eq!(s.score_delta, None);
        assert!(manager.state().held_rescores.is_empty());
        assert_eq!(manager.document(), original_document());
        assert_eq!(store.inner.entries(job_id)[0].score_delta, None);
    }

    // ── Concurrency ──

    #[tokio::test]
    async fn test_overlapping_accepts_never_rescore_concurrently() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_ok(65.0, Some(5.0));
        rescorer.push_ok(70.0, Some(5.0));
        let h = harness_with(
            vec![
                suggestion("a", SuggestionType::Skills, "", "Go"),
                suggestion("b", SuggestionType::Skills, "", "Kafka"),
            ],
            rescorer.clone(),
        );

        let (a, b) = tokio::join!(h.manager.accept("a"), h.manager.accept("b"));
        let statuses = [a.unwrap().rescore, b.unwrap().rescore];
        assert!(statuses.contains(&RescoreStatus::Deferred));

        assert_eq!(
            rescorer.events(),
            vec![
                "start:resume after a",
                "end:resume after a",
                "start:resume after b",
                "end:resume after b",
            ]
        );
        assert_eq!(h.manager.suggestion("a").unwrap().score_delta, Some(5.0));
        assert_eq!(h.manager.suggestion("b").unwrap().score_delta, Some(5.0));
    }

    #[tokio::test]
    async fn test_drain_while_busy_is_reported() {
        let h = harness_with(vec![], Arc::new(ScriptedRescorer::default()));
        let _permit = h.manager.inner.gate.try_acquire().unwrap();
        assert!(matches!(
            h.manager.drain_rescores().await,
            Err(ImprovementError::RescoreBusy)
        ));
        assert!(h.manager.view().rescore_busy);
    }

    #[tokio::test]
    async fn test_accept_all_is_sequential_and_halts_on_failure() {
        let mut blocked = suggestion("b", SuggestionType::Summary, "Old", "New");
        blocked.validation = Some(ValidationVerdict {
            status: ValidationStatus::Failed,
            matched_keywords: vec![],
            reason: None,
        });
        let rescorer = Arc::new(ScriptedRescorer::default());
        let h = harness_with(
            vec![
                suggestion("a", SuggestionType::Skills, "", "Go"),
                blocked,
                suggestion("c", SuggestionType::Skills, "", "Rust"),
            ],
            rescorer.clone(),
        );

        let report = h.manager.accept_all().await;
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].id, "a");
        assert!(matches!(
            report.halted,
            Some(ImprovementError::ValidationRejected { ref reason, .. })
                if reason == DEFAULT_VALIDATION_REASON
        ));
        assert_eq!(
            h.manager.suggestion("c").unwrap().acceptance,
            AcceptanceState::Undecided
        );
        assert_eq!(rescorer.events().len(), 2);
    }

    #[tokio::test]
    async fn test_accept_all_snapshots_after_previous_rescore() {
        let rescorer = Arc::new(ScriptedRescorer::default());
        rescorer.push_ok(70.0, Some(10.0));
        rescorer.push_ok(75.0, Some(5.0));
        let h = harness_with(
            vec![
                suggestion("a", SuggestionType::Skills, "", "Go"),
                suggestion("b", SuggestionType::Skills, "", "Rust"),
            ],
            rescorer,
        );

        let report = h.manager.accept_all().await;
        assert!(report.halted.is_none());
        assert_eq!(report.accepted.len(), 2);

        // b's snapshot saw a's rescored state, not the stale baseline.
        let snapshot = h.manager.inner.state.lock().unwrap().history.restore("b").unwrap();
        assert_eq!(snapshot.document.overall_score(), 70.0);
        assert_eq!(snapshot.change_log.len(), 1);
        assert_eq!(snapshot.change_log[0].score_delta, Some(10.0));
    }

    // ── Change log removal ──

    #[tokio::test]
    async fn test_only_reverted_entries_can_be_removed() {
        let h = harness_with(vec![s1()], Arc::new(ScriptedRescorer::default()));
        h.manager.accept("s1").await.unwrap();

        assert!(matches!(
            h.manager.remove_log_entry("s1").await,
            Err(ImprovementError::InvalidTransition { .. })
        ));

        h.manager.revert("s1").await.unwrap();
        h.manager.remove_log_entry("s1").await.unwrap();
        assert!(h.manager.change_log().is_empty());
        assert!(h.manager.history().is_empty());
        assert!(h.store.entries(h.job_id).is_empty());
    }

    #[tokio::test]
    async fn test_failed_remove_restores_local_entry() {
        let h = harness_with(vec![s1()], Arc::new(ScriptedRescorer::default()));
        h.manager.accept("s1").await.unwrap();
        h.manager.revert("s1").await.unwrap();
        h.store
            .fail_removes
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = h.manager.remove_log_entry("s1").await.unwrap_err();
        assert_eq!(err.phase(), Phase::Remove);
        assert_eq!(h.manager.change_log().len(), 1);
        assert!(h.manager.change_log()[0].reverted);
    }

    #[tokio::test]
    async fn test_summary_drops_reverted_contribution() {
        let h = harness_with(
            vec![
                suggestion("a", SuggestionType::Skills, "", "Go"),
                suggestion("b", SuggestionType::Skills, "", "Kafka"),
            ],
            Arc::new(ScriptedRescorer::default()),
        );
        h.manager.accept("a").await.unwrap();
        h.manager.accept("b").await.unwrap();
        assert_eq!(h.manager.summary().totals.entry_count, 2);

        h.manager.revert("b").await.unwrap();
        let summary = h.manager.summary();
        assert_eq!(summary.totals.entry_count, 1);
        assert_eq!(summary.categories[0].added, vec!["Go"]);
    }
}
