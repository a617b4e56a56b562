use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;

use crate::config::Config;
use crate::improvements::registry::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub s3: S3Client,
    pub config: Config,
    /// Open improvement sessions. Each owns its rescore gate and history store.
    pub sessions: Arc<SessionRegistry>,
}
