//! Artifact normalizer: turns the generation service's loosely shaped output descriptors
//! into one canonical artifact per document type.
//!
//! Accepted input shapes:
//! - an array of descriptors, bare URL strings, or nested URL arrays;
//! - a single descriptor object;
//! - an object keyed by artifact type whose values are descriptors, URLs or URL arrays.
//!
//! Retention per type: lower priority wins, then newer timestamp, then later position.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const DEFAULT_TYPE: &str = "document";

const TYPE_KEYS: &[&str] = &["type", "kind", "documentType", "document_type", "artifactType"];
const URL_KEYS: &[&str] = &[
    "url",
    "href",
    "signedUrl",
    "signed_url",
    "downloadUrl",
    "download_url",
    "link",
];
const STORAGE_KEYS: &[&str] = &["storageKey", "storage_key", "key", "s3Key", "s3_key"];
const EXPIRY_KEYS: &[&str] = &["expiresAt", "expires_at", "expiry", "expires"];
const TIMESTAMP_KEYS: &[&str] = &[
    "createdAt",
    "created_at",
    "generatedAt",
    "generated_at",
    "updatedAt",
    "updated_at",
];
const TEMPLATE_KEYS: &[&str] = &[
    "template",
    "templateId",
    "template_id",
    "templateMeta",
    "template_metadata",
];
const SOURCE_KEYS: &[&str] = &["source", "origin", "selection"];
const EXCLUDED_FLAGS: &[&str] = &[
    "test",
    "isTest",
    "is_test",
    "preview",
    "isPreview",
    "is_preview",
    "stale",
    "isStale",
    "is_stale",
    "archived",
    "isArchived",
    "is_archived",
];
const USER_SELECTED_FLAGS: &[&str] = &["userSelected", "user_selected", "selected"];
const AUTO_GENERATED_FLAGS: &[&str] = &["autoGenerated", "auto_generated"];
const EXCLUDED_STATUSES: &[&str] = &["test", "preview", "stale", "archived"];

/// Retention priority. Declaration order is rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPriority {
    UserSelected = 0,
    AutoGenerated = 1,
    Other = 2,
}

/// What to do with descriptors that carry no resolvable URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingUrlPolicy {
    #[default]
    Drop,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub storage_key: Option<String>,
    pub template: Option<Value>,
    pub priority: RetentionPriority,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub missing_url: bool,
}

impl OutputArtifact {
    /// Strict retention ordering; `position` is the descriptor's index in the input.
    fn outranks(&self, position: usize, current: &OutputArtifact, current_position: usize) -> bool {
        (self.priority, std::cmp::Reverse(self.created_at), std::cmp::Reverse(position))
            < (
                current.priority,
                std::cmp::Reverse(current.created_at),
                std::cmp::Reverse(current_position),
            )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Normalization
// ────────────────────────────────────────────────────────────────────────────

/// Canonicalizes and deduplicates artifact descriptors. Output keeps the order in which
/// each type first appeared.
pub fn normalize_artifacts(input: &Value, policy: MissingUrlPolicy) -> Vec<OutputArtifact> {
    let mut candidates = Vec::new();
    collect_candidates(input, None, &mut candidates);

    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, (usize, OutputArtifact)> = HashMap::new();

    for (position, (hint, value)) in candidates.into_iter().enumerate() {
        let Some(artifact) = extract_artifact(value, hint.as_deref()) else {
            continue;
        };
        if artifact.url.is_none() && policy == MissingUrlPolicy::Drop {
            debug!("Dropping {} artifact without a URL", artifact.artifact_type);
            continue;
        }

        match best.get(&artifact.artifact_type) {
            None => {
                order.push(artifact.artifact_type.clone());
                best.insert(artifact.artifact_type.clone(), (position, artifact));
            }
            Some((current_position, current)) => {
                if artifact.outranks(position, current, *current_position) {
                    debug!(
                        "Artifact {} at #{position} supersedes #{current_position}",
                        artifact.artifact_type
                    );
                    best.insert(artifact.artifact_type.clone(), (position, artifact));
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|artifact_type| best.remove(&artifact_type).map(|(_, a)| a))
        .collect()
}

fn collect_candidates<'a>(
    value: &'a Value,
    hint: Option<String>,
    out: &mut Vec<(Option<String>, &'a Value)>,
) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_candidates(item, hint.clone(), out);
            }
        }
        Value::Object(map) if hint.is_none() && !looks_like_descriptor(map) => {
            for (artifact_type, item) in map {
                collect_candidates(item, Some(artifact_type.clone()), out);
            }
        }
        Value::Object(_) | Value::String(_) => out.push((hint, value)),
        _ => {}
    }
}

fn looks_like_descriptor(map: &Map<String, Value>) -> bool {
    [TYPE_KEYS, URL_KEYS, STORAGE_KEYS]
        .iter()
        .flat_map(|keys| keys.iter())
        .chain(["file", "urls"].iter())
        .any(|key| map.contains_key(*key))
}

fn extract_artifact(value: &Value, hint: Option<&str>) -> Option<OutputArtifact> {
    let artifact_type = |explicit: Option<String>| {
        explicit
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_TYPE.to_string())
    };

    match value {
        Value::String(url) => {
            let url = non_empty(url)?;
            Some(OutputArtifact {
                artifact_type: artifact_type(None),
                url: Some(url),
                expires_at: None,
                storage_key: None,
                template: None,
                priority: RetentionPriority::Other,
                created_at: None,
                missing_url: false,
            })
        }
        Value::Object(map) => {
            if is_excluded(map) {
                debug!("Skipping excluded artifact descriptor");
                return None;
            }
            let url = resolve_url(map);
            Some(OutputArtifact {
                artifact_type: artifact_type(first_string(map, TYPE_KEYS)),
                missing_url: url.is_none(),
                url,
                expires_at: first_timestamp(map, EXPIRY_KEYS),
                storage_key: first_string(map, STORAGE_KEYS),
                template: TEMPLATE_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).filter(|v| !v.is_null()).cloned()),
                priority: resolve_priority(map),
                created_at: first_timestamp(map, TIMESTAMP_KEYS),
            })
        }
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_empty))
}

fn resolve_url(map: &Map<String, Value>) -> Option<String> {
    if let Some(url) = first_string(map, URL_KEYS) {
        return Some(url);
    }
    match map.get("file") {
        Some(Value::String(url)) => {
            if let Some(url) = non_empty(url) {
                return Some(url);
            }
        }
        Some(Value::Object(file)) => {
            if let Some(url) = first_string(file, URL_KEYS) {
                return Some(url);
            }
        }
        _ => {}
    }
    map.get("urls")
        .and_then(Value::as_array)
        .and_then(|urls| urls.iter().filter_map(Value::as_str).find_map(non_empty))
}

fn resolve_priority(map: &Map<String, Value>) -> RetentionPriority {
    if any_flag_set(map, USER_SELECTED_FLAGS) {
        return RetentionPriority::UserSelected;
    }
    if any_flag_set(map, AUTO_GENERATED_FLAGS) {
        return RetentionPriority::AutoGenerated;
    }

    let source = first_string(map, SOURCE_KEYS)
        .map(|s| s.to_lowercase().replace(['-', '_', ' '], ""))
        .unwrap_or_default();
    match source.as_str() {
        "userselected" | "user" | "selected" | "manual" => RetentionPriority::UserSelected,
        "autogenerated" | "auto" | "generated" | "system" => RetentionPriority::AutoGenerated,
        _ => RetentionPriority::Other,
    }
}

fn is_excluded(map: &Map<String, Value>) -> bool {
    let flagged = any_flag_set(map, EXCLUDED_FLAGS);
    let status = ["status", "state"]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .any(|s| EXCLUDED_STATUSES.contains(&s.to_lowercase().as_str()));
    flagged || status
}

fn any_flag_set(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|key| map.get(*key) == Some(&Value::Bool(true)))
}

fn first_timestamp(map: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| map.get(*key).and_then(parse_timestamp))
}

/// RFC 3339 strings, or epoch numbers in seconds or milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 1_000_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}
