//! Change log persistence: the I/O boundary between the in-memory change log cache and
//! the authoritative store.
//!
//! The adapter never touches local state. Callers apply optimistic updates themselves and
//! roll them back when a call here fails; on success they adopt the returned list verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::improvements::error::{ImprovementError, Phase};
use crate::improvements::models::ChangeLogEntry;
use crate::models::change_log::ChangeLogRow;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store rejected request: {0}")]
    Rejected(String),
}

/// Authoritative change log storage. Every mutating call returns the full post-call log.
#[async_trait]
pub trait ChangeLogStore: Send + Sync {
    async fn write(
        &self,
        job_id: Uuid,
        entry: &ChangeLogEntry,
    ) -> Result<Vec<ChangeLogEntry>, StoreError>;

    async fn remove(&self, job_id: Uuid, entry_id: &str)
        -> Result<Vec<ChangeLogEntry>, StoreError>;

    async fn list(&self, job_id: Uuid) -> Result<Vec<ChangeLogEntry>, StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL store
// ────────────────────────────────────────────────────────────────────────────

/// Change log backed by the `improvement_change_log` table.
///
/// Entries upsert on `(job_id, entry_id)`; `created_at` is set once, so list order is
/// the order entries were first written.
pub struct PgChangeLogStore {
    pool: PgPool,
}

impl PgChangeLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeLogStore for PgChangeLogStore {
    async fn write(
        &self,
        job_id: Uuid,
        entry: &ChangeLogEntry,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO improvement_change_log (job_id, entry_id, entry)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id, entry_id)
            DO UPDATE SET entry = EXCLUDED.entry, updated_at = NOW()
            "#,
        )
        .bind(job_id)
        .bind(&entry.id)
        .bind(Json(entry))
        .execute(&self.pool)
        .await?;

        debug!("Upserted change log entry {} for job {job_id}", entry.id);
        self.list(job_id).await
    }

    async fn remove(
        &self,
        job_id: Uuid,
        entry_id: &str,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        let result =
            sqlx::query("DELETE FROM improvement_change_log WHERE job_id = $1 AND entry_id = $2")
                .bind(job_id)
                .bind(entry_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!(
                "entry {entry_id} does not exist for job {job_id}"
            )));
        }
        self.list(job_id).await
    }

    async fn list(&self, job_id: Uuid) -> Result<Vec<ChangeLogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, ChangeLogRow>(
            r#"
            SELECT job_id, entry_id, entry, created_at, updated_at
            FROM improvement_change_log
            WHERE job_id = $1
            ORDER BY created_at ASC, entry_id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.entry.0).collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Adapter
// ────────────────────────────────────────────────────────────────────────────

/// Binds a store to one job and translates store failures into `PersistenceFailed`.
#[derive(Clone)]
pub struct ChangeLogPersistenceAdapter {
    store: Arc<dyn ChangeLogStore>,
    job_id: Uuid,
}

impl ChangeLogPersistenceAdapter {
    pub fn new(store: Arc<dyn ChangeLogStore>, job_id: Uuid) -> Self {
        Self { store, job_id }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Writes `entry` and returns the authoritative full log.
    pub async fn write(
        &self,
        entry: &ChangeLogEntry,
        phase: Phase,
    ) -> Result<Vec<ChangeLogEntry>, ImprovementError> {
        self.store
            .write(self.job_id, entry)
            .await
            .map_err(|e| {
                warn!(
                    "Change log write for {} (job {}) failed: {e}",
                    entry.id, self.job_id
                );
                ImprovementError::PersistenceFailed {
                    id: entry.id.clone(),
                    phase,
                    message: e.to_string(),
                }
            })
    }

    /// Removes `entry_id` remotely and returns the authoritative post-removal log.
    pub async fn remove(&self, entry_id: &str) -> Result<Vec<ChangeLogEntry>, ImprovementError> {
        self.store
            .remove(self.job_id, entry_id)
            .await
            .map_err(|e| {
                warn!(
                    "Change log remove for {entry_id} (job {}) failed: {e}",
                    self.job_id
                );
                ImprovementError::PersistenceFailed {
                    id: entry_id.to_string(),
                    phase: Phase::Remove,
                    message: e.to_string(),
                }
            })
    }

    pub async fn load(&self) -> Result<Vec<ChangeLogEntry>, StoreError> {
        self.store.list(self.job_id).await
    }
}
