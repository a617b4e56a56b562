pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::artifacts::handlers as artifacts;
use crate::improvements::handlers as improvements;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Improvements API
        .route(
            "/api/v1/improvements/sessions",
            post(improvements::handle_open_session),
        )
        .route(
            "/api/v1/improvements/:job_id",
            get(improvements::handle_get_session),
        )
        .route(
            "/api/v1/improvements/:job_id/suggestions/:id/accept",
            post(improvements::handle_accept),
        )
        .route(
            "/api/v1/improvements/:job_id/suggestions/:id/reject",
            post(improvements::handle_reject),
        )
        .route(
            "/api/v1/improvements/:job_id/suggestions/:id/revert",
            post(improvements::handle_revert),
        )
        .route(
            "/api/v1/improvements/:job_id/accept-all",
            post(improvements::handle_accept_all),
        )
        .route(
            "/api/v1/improvements/:job_id/rescore/drain",
            post(improvements::handle_drain),
        )
        .route(
            "/api/v1/improvements/:job_id/summary",
            get(improvements::handle_summary),
        )
        .route(
            "/api/v1/improvements/:job_id/history",
            get(improvements::handle_history),
        )
        .route(
            "/api/v1/improvements/:job_id/change-log/:entry_id",
            delete(improvements::handle_remove_entry),
        )
        // Artifacts API
        .route(
            "/api/v1/artifacts/normalize",
            post(artifacts::handle_normalize),
        )
        .with_state(state)
}
