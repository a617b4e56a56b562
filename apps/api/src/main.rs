mod artifacts;
mod config;
mod db;
mod errors;
mod improvements;
mod models;
mod routes;
mod state;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::improvements::persistence::PgChangeLogStore;
use crate::improvements::registry::SessionRegistry;
use crate::improvements::rescore::{HttpRescorer, KeywordRescorer, Rescorer};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Revisions API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (change log store)
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgChangeLogStore::new(db));

    // Initialize S3 / MinIO (artifact presigning)
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize rescorer (KeywordRescorer unless RESCORE_URL is set)
    let rescorer: Arc<dyn Rescorer> = match &config.rescore_url {
        Some(url) => {
            info!("Rescoring via {url}");
            Arc::new(HttpRescorer::new(
                url.clone(),
                Duration::from_secs(config.rescore_timeout_secs),
            )?)
        }
        None => {
            info!("Rescoring with in-process keyword coverage");
            Arc::new(KeywordRescorer)
        }
    };

    // Build app state
    let state = AppState {
        s3,
        config: config.clone(),
        sessions: Arc::new(SessionRegistry::new(store, rescorer)),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "revisions-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
