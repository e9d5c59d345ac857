use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::AppState;

/// GET /api/jobs/status - polled progress of the current or last job
pub async fn job_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.jobs.status().await)
}

/// POST /api/jobs/cancel - stop the running job. In-flight probes get the
/// configured grace period, channels not yet probed keep their status.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if !state.jobs.cancel().await {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "No job is running" })),
        ));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "cancelling" })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::{JobKind, JobOutcome, JobPhase};

    #[tokio::test]
    async fn test_cancel_without_job_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.snapshot_path = dir.path().join("last_playlist.json");
        let state = Arc::new(AppState::new(config).await.unwrap());

        let result = cancel_job(State(state.clone())).await;
        assert!(result.is_err());

        let job = state.jobs.begin(JobKind::Probe).await;
        assert!(cancel_job(State(state.clone())).await.is_ok());
        assert!(job.token().is_cancelled());
        job.finish(JobOutcome::Cancelled("stopped".to_string())).await;
        assert_eq!(state.jobs.status().await.phase, JobPhase::Cancelled);
    }
}
