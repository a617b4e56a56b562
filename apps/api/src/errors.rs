use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::improvements::error::ImprovementError;
use crate::improvements::persistence::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Improvement(#[from] ImprovementError),

    #[error("Change log store error: {0}")]
    Store(#[from] StoreError),

    #[error("S3 error: {0}")]
    S3(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Improvement(e) => match e {
                ImprovementError::SuggestionNotFound { .. } => StatusCode::NOT_FOUND,
                ImprovementError::ValidationRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ImprovementError::InvalidTransition { .. } | ImprovementError::RescoreBusy => {
                    StatusCode::CONFLICT
                }
                ImprovementError::PersistenceFailed { .. }
                | ImprovementError::RescoreFailed { .. } => StatusCode::BAD_GATEWAY,
                ImprovementError::SnapshotMissing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Store(_) | AppError::S3(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let error = match &self {
            AppError::NotFound(msg) => json!({ "code": "NOT_FOUND", "message": msg }),
            AppError::Validation(msg) => json!({ "code": "VALIDATION_ERROR", "message": msg }),
            AppError::Conflict(msg) => json!({ "code": "CONFLICT", "message": msg }),
            AppError::Improvement(e) => {
                if status.is_server_error() {
                    tracing::error!("Improvement error ({}): {e}", e.phase());
                }
                json!(e.detail())
            }
            AppError::Store(e) => {
                tracing::error!("Change log store error: {e}");
                json!({
                    "code": "STORE_ERROR",
                    "message": "The change log store is unavailable"
                })
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                json!({
                    "code": "S3_ERROR",
                    "message": "A storage error occurred"
                })
            }
        };

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::improvements::error::Phase;

    #[test]
    fn test_improvement_status_mapping() {
        let busy = AppError::from(ImprovementError::RescoreBusy);
        assert_eq!(busy.status(), StatusCode::CONFLICT);

        let rejected = AppError::from(ImprovementError::ValidationRejected {
            id: "s1".to_string(),
            reason: "not aligned".to_string(),
        });
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let persistence = AppError::from(ImprovementError::PersistenceFailed {
            id: "s1".to_string(),
            phase: Phase::Accept,
            message: "down".to_string(),
        });
        assert_eq!(persistence.status(), StatusCode::BAD_GATEWAY);

        let missing = AppError::from(ImprovementError::SnapshotMissing {
            id: "s1".to_string(),
        });
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_response_status_matches_mapping() {
        let response = AppError::NotFound("session".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::from(ImprovementError::InvalidTransition {
            id: "s1".to_string(),
            phase: Phase::Revert,
            state: crate::improvements::models::AcceptanceState::Undecided,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
