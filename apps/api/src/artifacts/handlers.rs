//! Axum route handlers for the Artifacts API.

use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::artifacts::normalizer::{normalize_artifacts, MissingUrlPolicy, OutputArtifact};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NormalizeRequest {
    /// Raw descriptors as returned by the generation service.
    pub artifacts: Value,
    #[serde(default)]
    pub missing_url: MissingUrlPolicy,
}

#[derive(Debug, Serialize)]
pub struct NormalizeResponse {
    pub artifacts: Vec<OutputArtifact>,
    /// Flagged artifacts that got a fresh presigned URL from their storage key.
    pub presigned: usize,
}

/// POST /api/v1/artifacts/normalize
pub async fn handle_normalize(
    State(state): State<AppState>,
    Json(req): Json<NormalizeRequest>,
) -> Result<Json<NormalizeResponse>, AppError> {
    let mut artifacts = normalize_artifacts(&req.artifacts, req.missing_url);
    let ttl = Duration::from_secs(state.config.artifact_url_ttl_secs);

    let mut presigned = 0;
    for artifact in artifacts.iter_mut().filter(|a| a.missing_url) {
        let Some(key) = artifact.storage_key.as_deref() else {
            continue;
        };
        let url = presign_get(&state.s3, &state.config.s3_bucket, key, ttl).await?;
        artifact.url = Some(url);
        artifact.expires_at = Some(Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64));
        artifact.missing_url = false;
        presigned += 1;
    }

    info!(
        "Normalized artifacts: {} kept, {presigned} presigned",
        artifacts.len()
    );
    Ok(Json(NormalizeResponse {
        artifacts,
        presigned,
    }))
}

/// Presigned GET for `key` in `bucket`, valid for `ttl`.
async fn presign_get(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    ttl: Duration,
) -> Result<String, AppError> {
    let config = PresigningConfig::expires_in(ttl)
        .map_err(|e| AppError::S3(format!("Invalid presign lifetime: {e}")))?;
    let request = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .presigned(config)
        .await
        .map_err(|e| AppError::S3(format!("Presign failed for {key}: {e}")))?;
    Ok(request.uri().to_string())
}
