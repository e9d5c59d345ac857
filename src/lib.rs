pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::models::Catalog;
use crate::services::{Downloader, JobTracker, M3UParser, Prober, SnapshotStore};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    /// The one catalog; whoever holds the lock owns it for the whole job
    pub catalog: Arc<Mutex<Catalog>>,
    pub parser: M3UParser,
    pub prober: Prober,
    pub downloader: Downloader,
    pub snapshot: SnapshotStore,
    pub jobs: Arc<JobTracker>,
    pub start_time: Instant,
}

impl AppState {
    /// Build services from config and load the last snapshot
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let prober = Prober::new(config.probe_options()).context("building probe client")?;
        let downloader =
            Downloader::new(config.download_options()).context("building download client")?;
        let snapshot = SnapshotStore::new(config.snapshot_path.clone());
        let catalog = snapshot.load().await;

        Ok(Self {
            parser: M3UParser::new(config.parse_progress_every),
            catalog: Arc::new(Mutex::new(catalog)),
            prober,
            downloader,
            snapshot,
            jobs: JobTracker::new(),
            start_time: Instant::now(),
            config,
        })
    }
}

/// Build the HTTP router
pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/live", get(routes::health::live))
        // Catalog endpoints
        .route("/api/catalog", get(routes::catalog::get_channels))
        .route("/api/catalog/groups", get(routes::catalog::get_groups))
        .route("/api/catalog/stats", get(routes::catalog::get_stats))
        .route("/api/catalog/load", post(routes::catalog::load_catalog))
        .route("/api/catalog/probe", post(routes::catalog::start_probe))
        .route("/api/catalog/unify", post(routes::catalog::unify_catalog))
        .route("/api/catalog/export", get(routes::catalog::export_playlist))
        // Job endpoints
        .route("/api/jobs/status", get(routes::jobs::job_status))
        .route("/api/jobs/cancel", post(routes::jobs::cancel_job))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
