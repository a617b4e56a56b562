use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::improvements::models::ChangeLogEntry;

/// One row of `improvement_change_log`. The entry itself is stored as JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChangeLogRow {
    pub job_id: Uuid,
    pub entry_id: String,
    pub entry: Json<ChangeLogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
