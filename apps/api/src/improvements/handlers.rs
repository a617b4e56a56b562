//! Axum route handlers for the Improvements API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::improvements::error::ErrorDetail;
use crate::improvements::gate::DrainReport;
use crate::improvements::history::SnapshotInfo;
use crate::improvements::lifecycle::{AcceptOutcome, RescoreStatus, SessionView};
use crate::improvements::models::{ChangeLogEntry, ImprovementSuggestion};
use crate::improvements::registry::OpenSessionRequest;
use crate::improvements::summary::AggregatedSummary;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SuggestionResponse {
    pub suggestion: Option<ImprovementSuggestion>,
    /// Present for accepts only.
    pub rescore: Option<RescoreStatus>,
    pub summary: AggregatedSummary,
}

#[derive(Debug, Serialize)]
pub struct AcceptAllResponse {
    pub accepted: Vec<AcceptOutcome>,
    pub halted: Option<ErrorDetail>,
    pub summary: AggregatedSummary,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/improvements/sessions
pub async fn handle_open_session(
    State(state): State<AppState>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let manager = state.sessions.open(req).await?;
    Ok((StatusCode::CREATED, Json(manager.view())))
}

/// GET /api/v1/improvements/:job_id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    Ok(Json(manager.view()))
}

/// POST /api/v1/improvements/:job_id/suggestions/:id/accept
pub async fn handle_accept(
    State(state): State<AppState>,
    Path((job_id, id)): Path<(Uuid, String)>,
) -> Result<Json<SuggestionResponse>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    let outcome = manager.accept(&id).await?;
    Ok(Json(SuggestionResponse {
        suggestion: manager.suggestion(&id),
        rescore: Some(outcome.rescore),
        summary: manager.summary(),
    }))
}

/// POST /api/v1/improvements/:job_id/suggestions/:id/reject
pub async fn handle_reject(
    State(state): State<AppState>,
    Path((job_id, id)): Path<(Uuid, String)>,
) -> Result<Json<SuggestionResponse>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    manager.reject(&id).await?;
    Ok(Json(SuggestionResponse {
        suggestion: manager.suggestion(&id),
        rescore: None,
        summary: manager.summary(),
    }))
}

/// POST /api/v1/improvements/:job_id/suggestions/:id/revert
pub async fn handle_revert(
    State(state): State<AppState>,
    Path((job_id, id)): Path<(Uuid, String)>,
) -> Result<Json<SuggestionResponse>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    manager.revert(&id).await?;
    Ok(Json(SuggestionResponse {
        suggestion: manager.suggestion(&id),
        rescore: None,
        summary: manager.summary(),
    }))
}

/// POST /api/v1/improvements/:job_id/accept-all
///
/// Always 200: a halt is reported in the body alongside the accepts that did land.
pub async fn handle_accept_all(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<AcceptAllResponse>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    let report = manager.accept_all().await;
    Ok(Json(AcceptAllResponse {
        accepted: report.accepted,
        halted: report.halted.as_ref().map(|e| e.detail()),
        summary: manager.summary(),
    }))
}

/// POST /api/v1/improvements/:job_id/rescore/drain
pub async fn handle_drain(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DrainReport>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    Ok(Json(manager.drain_rescores().await?))
}

/// GET /api/v1/improvements/:job_id/summary
pub async fn handle_summary(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<AggregatedSummary>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    Ok(Json(manager.summary()))
}

/// GET /api/v1/improvements/:job_id/history
pub async fn handle_history(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<SnapshotInfo>>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    Ok(Json(manager.history()))
}

/// DELETE /api/v1/improvements/:job_id/change-log/:entry_id
pub async fn handle_remove_entry(
    State(state): State<AppState>,
    Path((job_id, entry_id)): Path<(Uuid, String)>,
) -> Result<Json<Vec<ChangeLogEntry>>, AppError> {
    let manager = state.sessions.get(job_id).await?;
    manager.remove_log_entry(&entry_id).await?;
    Ok(Json(manager.change_log()))
}
