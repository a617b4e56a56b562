use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::improvements::error::ImprovementError;
use crate::improvements::models::ResumeHistorySnapshot;

struct StoredSnapshot {
    version: u64,
    saved_at: DateTime<Utc>,
    retired: bool,
    snapshot: ResumeHistorySnapshot,
}

/// Display row for the snapshot ledger.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    pub retired: bool,
}

/// Pre-accept snapshots keyed by suggestion id.
///
/// Snapshots are copied on the way in and on the way out, so mutating the live
/// document after `save` can never reach back into a stored snapshot.
#[derive(Default)]
pub struct VersionedHistoryStore {
    snapshots: HashMap<String, StoredSnapshot>,
    next_version: u64,
}

impl VersionedHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a copy of `snapshot` under `id`. Last write wins.
    pub fn save(&mut self, id: &str, snapshot: &ResumeHistorySnapshot) -> u64 {
        self.next_version += 1;
        let version = self.next_version;
        self.snapshots.insert(
            id.to_string(),
            StoredSnapshot {
                version,
                saved_at: Utc::now(),
                retired: false,
                snapshot: snapshot.clone(),
            },
        );
        version
    }

    /// Returns a copy of the snapshot stored under `id`.
    pub fn restore(&self, id: &str) -> Result<ResumeHistorySnapshot, ImprovementError> {
        self.snapshots
            .get(id)
            .map(|stored| stored.snapshot.clone())
            .ok_or_else(|| ImprovementError::SnapshotMissing { id: id.to_string() })
    }

    /// Marks a consumed snapshot as retired. It stays listed but is not reused.
    pub fn retire(&mut self, id: &str) {
        if let Some(stored) = self.snapshots.get_mut(id) {
            stored.retired = true;
        }
    }

    pub fn forget(&mut self, id: &str) -> bool {
        self.snapshots.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshots.contains_key(id)
    }

    /// Snapshot ledger, oldest save first.
    pub fn list(&self) -> Vec<SnapshotInfo> {
        let mut rows: Vec<SnapshotInfo> = self
            .snapshots
            .iter()
            .map(|(id, stored)| SnapshotInfo {
                id: id.clone(),
                version: stored.version,
                saved_at: stored.saved_at,
                retired: stored.retired,
            })
            .collect();
        rows.sort_by_key(|r| r.version);
        rows
    }
}
