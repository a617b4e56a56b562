//! Session registry: one `SuggestionLifecycleManager` per job, each with its own gate and
//! history store.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::improvements::gate::ConcurrencyGate;
use crate::improvements::lifecycle::{SessionSeed, SuggestionLifecycleManager};
use crate::improvements::models::{DocumentState, ImprovementSuggestion, JobContext};
use crate::improvements::persistence::{ChangeLogPersistenceAdapter, ChangeLogStore};
use crate::improvements::rescore::Rescorer;

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    /// Reuse an existing job id to pick up its persisted change log.
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub job_context: JobContext,
    pub document: DocumentState,
    #[serde(default)]
    pub suggestions: Vec<ImprovementSuggestion>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SuggestionLifecycleManager>>,
    store: Arc<dyn ChangeLogStore>,
    rescorer: Arc<dyn Rescorer>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ChangeLogStore>, rescorer: Arc<dyn Rescorer>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            rescorer,
        }
    }

    /// Opens a session, seeding its change log cache from the store.
    pub async fn open(
        &self,
        request: OpenSessionRequest,
    ) -> Result<SuggestionLifecycleManager, AppError> {
        validate_suggestions(&request.suggestions)?;

        let job_id = request.job_id.unwrap_or_else(Uuid::new_v4);
        if self.sessions.read().await.contains_key(&job_id) {
            return Err(AppError::Conflict(format!(
                "Session for job {job_id} is already open"
            )));
        }

        let persistence = ChangeLogPersistenceAdapter::new(Arc::clone(&self.store), job_id);
        let change_log = persistence.load().await?;

        let suggestions = request
            .suggestions
            .into_iter()
            .map(|mut s| {
                s.rescore_pending = false;
                s
            })
            .collect::<Vec<_>>();
        let suggestion_count = suggestions.len();
        let entry_count = change_log.len();

        let manager = SuggestionLifecycleManager::new(
            SessionSeed {
                job_context: request.job_context,
                document: request.document,
                suggestions,
                change_log,
            },
            Arc::clone(&self.rescorer),
            persistence,
            Arc::new(ConcurrencyGate::new()),
        );

        match self.sessions.write().await.entry(job_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "Session for job {job_id} is already open"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(manager.clone());
                info!(
                    "Opened improvement session {job_id}: {suggestion_count} suggestion(s), {entry_count} persisted change log entr(ies)"
                );
                Ok(manager)
            }
        }
    }

    pub async fn get(&self, job_id: Uuid) -> Result<SuggestionLifecycleManager, AppError> {
        self.sessions
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Improvement session {job_id} not found")))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn validate_suggestions(suggestions: &[ImprovementSuggestion]) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    for s in suggestions {
        if s.id.trim().is_empty() {
            return Err(AppError::Validation("Suggestion id must not be empty".to_string()));
        }
        if !seen.insert(s.id.as_str()) {
            return Err(AppError::Validation(format!(
                "Duplicate suggestion id '{}'",
                s.id
            )));
        }
        if !(0.0..=1.0).contains(&s.confidence) {
            return Err(AppError::Validation(format!(
                "Suggestion '{}' confidence {} is outside [0, 1]",
                s.id, s.confidence
            )));
        }
    }
    Ok(())
}
