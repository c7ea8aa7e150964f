mod api;
mod config;
mod engine;
mod models;
mod storage;
mod store;
mod sweeper;
mod worker;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use config::Config;
use engine::{CommandEngine, SeparationEngine};
use store::JobStore;
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jobs: JobStore,
    pub queue_tx: mpsc::Sender<String>,
    pub engine: Arc<dyn SeparationEngine>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "splitai_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    storage::ensure_storage_root(&config.storage_root).await?;

    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
    let state = AppState {
        config: config.clone(),
        jobs: JobStore::new(),
        queue_tx,
        engine: Arc::new(CommandEngine::new(config.separator_cmd.clone())),
    };

    worker::spawn_separation_worker(state.clone(), queue_rx);
    sweeper::spawn_retention_sweeper(state.clone());

    // The handler owns the 413 decision, so the transport limit sits
    // above the configured cap (with room for multipart framing).
    let body_limit = (config.max_upload_bytes as usize) * 2 + 1024 * 1024;

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/upload", post(api::upload_audio))
        .route("/status/{job_id}", get(api::job_status))
        .route("/download/{job_id}/{stem}", get(api::download_stem))
        .route("/job/{job_id}", delete(api::delete_job))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("splitai-api listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
