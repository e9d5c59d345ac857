use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::JobPhase;
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "IPTV Catalog",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    /// `None` while a job holds the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<usize>,
    job: JobPhase,
    snapshot: bool,
}

/// GET /health - service status, catalog size and job phase
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    // Never wait on a running job
    let channels = state.catalog.try_lock().ok().map(|c| c.len());
    let job = state.jobs.status().await.phase;
    let snapshot = tokio::fs::try_exists(state.snapshot.path())
        .await
        .unwrap_or(false);

    let status = if job == JobPhase::Running { "busy" } else { "ok" };

    Json(HealthResponse {
        status: status.to_string(),
        uptime,
        channels,
        job,
        snapshot,
    })
}

/// Liveness probe
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
