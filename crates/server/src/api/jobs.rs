//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use recast_core::{
    EnqueueRequest, JobFilter, JobStatus, JobStore, JobView, RestoreOutcome, RestoreSource,
};

use super::error::{api_error, scheduler_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Comma-separated status names
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
    /// Matching jobs, ignoring limit and offset
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct RestoreBody {
    pub source: RestoreSource,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub job_id: String,
    pub source: RestoreSource,
    pub outcome: RestoreOutcome,
}

fn parse_statuses(raw: &str) -> Result<Vec<JobStatus>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<JobStatus>()
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
        })
        .collect()
}

fn view(state: &AppState, id: &str) -> Result<Json<JobView>, ApiError> {
    state.scheduler().job(id).map(Json).map_err(scheduler_error)
}

// ============================================================================
// Handlers
// ============================================================================

/// Probe a remote file and queue it
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let job = state
        .scheduler()
        .enqueue(body)
        .await
        .map_err(scheduler_error)?;
    Ok((StatusCode::CREATED, view(&state, &job.id)?))
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);
    if let Some(raw) = params.status.as_deref() {
        filter = filter.with_statuses(parse_statuses(raw)?);
    }

    let jobs = state.scheduler().jobs(&filter).map_err(scheduler_error)?;

    let count_filter = JobFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };
    let total = state
        .scheduler()
        .store()
        .count(&count_filter)
        .map_err(|e| scheduler_error(e.into()))?;

    Ok(Json(ListJobsResponse {
        jobs,
        total,
        limit,
        offset,
    }))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    view(&state, &id)
}

/// Remove a job and its local working files
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .scheduler()
        .delete(&id)
        .await
        .map_err(scheduler_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approve_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.scheduler().approve(&id).map_err(scheduler_error)?;
    view(&state, &id)
}

/// Discard the encoded output and encode again
pub async fn reject_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.scheduler().reject(&id).map_err(scheduler_error)?;
    view(&state, &id)
}

pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.scheduler().retry(&id).map_err(scheduler_error)?;
    view(&state, &id)
}

pub async fn pause_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.scheduler().pause(&id).map_err(scheduler_error)?;
    view(&state, &id)
}

pub async fn resume_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.scheduler().resume(&id).map_err(scheduler_error)?;
    view(&state, &id)
}

/// Put the original (or the kept encode) back on the server
pub async fn restore_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RestoreBody>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let outcome = state
        .scheduler()
        .restore(&id, body.source)
        .await
        .map_err(scheduler_error)?;
    Ok(Json(RestoreResponse {
        job_id: id,
        source: body.source,
        outcome,
    }))
}
