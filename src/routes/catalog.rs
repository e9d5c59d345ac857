use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use crate::error::CatalogError;
use crate::models::{
    Catalog, ChannelsQuery, ChannelsResponse, ExportQuery, GroupsResponse, LoadRequest,
};
use crate::services::m3u_writer::{render_playlist, save_playlist, save_working_channels};
use crate::services::{unify, JobHandle, JobKind, JobOutcome, ProbeSummary};
use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

fn busy() -> ApiError {
    api_error(StatusCode::CONFLICT, "A job is running on the catalog, try again later")
}

fn catalog_error(e: &CatalogError) -> ApiError {
    let status = match e {
        CatalogError::Format(_) | CatalogError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CatalogError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        CatalogError::Network(_) | CatalogError::Timeout(_) | CatalogError::Connection(_) => {
            StatusCode::BAD_GATEWAY
        }
        CatalogError::MalformedUrl(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// Take the catalog for a job, or answer 409 when another one holds it
fn acquire(state: &AppState) -> Result<OwnedMutexGuard<Catalog>, ApiError> {
    state.catalog.clone().try_lock_owned().map_err(|_| busy())
}

/// Persist after a job; a failed write is logged, the in-memory catalog stays
async fn save_snapshot(state: &AppState, catalog: &Catalog) {
    if let Err(e) = state.snapshot.save(catalog).await {
        tracing::error!("Failed to save snapshot: {}", e);
    }
}

/// GET /api/catalog - channels, optionally filtered by group
pub async fn get_channels(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChannelsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = state.catalog.try_lock().map_err(|_| busy())?;

    let group = query.group.as_deref().filter(|g| !g.is_empty());
    let channels: Vec<_> = catalog
        .channels_by_group(group)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(ChannelsResponse {
        total: channels.len(),
        channels,
    }))
}

/// GET /api/catalog/groups
pub async fn get_groups(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = state.catalog.try_lock().map_err(|_| busy())?;

    Ok(Json(GroupsResponse {
        total: catalog.groups.len(),
        groups: catalog.groups.clone(),
    }))
}

/// GET /api/catalog/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let catalog = state.catalog.try_lock().map_err(|_| busy())?;
    Ok(Json(catalog.stats()))
}

/// POST /api/catalog/load - download a URL or read a local file, then parse.
/// The previous catalog is kept when loading fails.
pub async fn load_catalog(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = match (payload.url.as_deref(), payload.path.as_deref()) {
        (Some(url), None) if !url.trim().is_empty() => Source::Url(url.trim().to_string()),
        (None, Some(path)) if !path.trim().is_empty() => Source::File(PathBuf::from(path.trim())),
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Provide exactly one of \"url\" or \"path\"",
            ))
        }
    };

    let mut catalog = acquire(&state)?;
    let job = state.jobs.begin(JobKind::Load).await;

    let path = match source {
        Source::File(path) => path,
        Source::Url(url) => {
            let result = state.downloader.download(&url).await;
            match result.path {
                Some(path) if result.success => path,
                _ => {
                    job.finish(JobOutcome::Failed(result.message.clone())).await;
                    return Err(api_error(StatusCode::BAD_GATEWAY, result.message));
                }
            }
        }
    };

    let loaded = match state.parser.parse_file(&path, Some(job.progress())).await {
        Ok(loaded) => loaded,
        Err(e) => {
            job.finish(JobOutcome::Failed(e.to_string())).await;
            return Err(catalog_error(&e));
        }
    };

    *catalog = loaded;
    save_snapshot(&state, &catalog).await;

    let stats = catalog.stats();
    let groups = catalog.groups.clone();
    drop(catalog);

    job.finish(JobOutcome::Complete(format!(
        "Loaded {} channels from {}",
        stats.total,
        path.display()
    )))
    .await;

    Ok(Json(serde_json::json!({
        "status": "complete",
        "source": path,
        "stats": stats,
        "groups": groups,
    })))
}

enum Source {
    Url(String),
    File(PathBuf),
}

/// POST /api/catalog/probe - start a background probe of every channel.
/// Poll /api/jobs/status for progress, /api/jobs/cancel to stop it.
pub async fn start_probe(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = acquire(&state)?;
    let total = catalog.len();
    let job = state.jobs.begin(JobKind::Probe).await;

    tokio::spawn(async move {
        let outcome = match run_probe_job(&state, catalog, &job).await {
            Ok(summary) => {
                let message = format!(
                    "{} online, {} slow, {} offline, {} of {} checked",
                    summary.online, summary.slow, summary.offline, summary.completed, summary.total
                );
                if summary.cancelled {
                    JobOutcome::Cancelled(message)
                } else {
                    JobOutcome::Complete(message)
                }
            }
            Err(e) => JobOutcome::Failed(format!("{:#}", e)),
        };
        job.finish(outcome).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "probing",
            "total": total,
        })),
    ))
}

/// Probe with the catalog held for the whole run, then persist.
/// The lock is released before the caller records the outcome.
async fn run_probe_job(
    state: &AppState,
    mut catalog: OwnedMutexGuard<Catalog>,
    job: &JobHandle,
) -> anyhow::Result<ProbeSummary> {
    let summary = state
        .prober
        .probe_all(&mut catalog.channels, job.token(), Some(job.progress()))
        .await;

    state
        .snapshot
        .save(&catalog)
        .await
        .context("saving snapshot after probe")?;

    Ok(summary)
}

/// POST /api/catalog/unify - merge duplicate URLs and near-identical names
pub async fn unify_catalog(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut catalog = acquire(&state)?;
    let job = state.jobs.begin(JobKind::Unify).await;

    let report = unify(&mut catalog, Some(job.progress()));
    save_snapshot(&state, &catalog).await;
    let stats = catalog.stats();
    drop(catalog);

    job.finish(JobOutcome::Complete(format!(
        "{} duplicates removed, {} names unified",
        report.duplicates_removed, report.names_unified
    )))
    .await;

    Ok(Json(serde_json::json!({
        "report": report,
        "stats": stats,
    })))
}

/// GET /api/catalog/export - playlist text, or saved into the download
/// directory with `save=true`
pub async fn export_playlist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<axum::response::Response, ApiError> {
    let catalog = state.catalog.try_lock().map_err(|_| busy())?;

    if query.working && catalog.working_channels().is_empty() {
        return Err(api_error(StatusCode::NOT_FOUND, "No working channels to export"));
    }

    let file_name = if query.working {
        "working_channels.m3u"
    } else {
        "catalog.m3u"
    };

    if query.save {
        let dir = &state.config.download_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| catalog_error(&CatalogError::Io(e)))?;
        let path = dir.join(file_name);
        let written = if query.working {
            save_working_channels(&path, &catalog).await
        } else {
            save_playlist(&path, &catalog).await
        }
        .map_err(|e| catalog_error(&e))?;

        return Ok(Json(serde_json::json!({
            "saved": written,
            "path": path,
        }))
        .into_response());
    }

    let text = if query.working {
        render_playlist(catalog.working_channels())
    } else {
        render_playlist(&catalog.channels)
    };

    Ok((
        [
            (header::CONTENT_TYPE, "audio/x-mpegurl".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        text,
    )
        .into_response())
}
