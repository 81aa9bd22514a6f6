//! Live pipeline settings.
//!
//! Changes apply to the next admission pass. Jobs already past encode keep
//! the parameters they were encoded with.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

use recast_core::{PipelineSettings, SettingsProvider};

use super::error::{api_error, ApiError};
use crate::state::AppState;

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<PipelineSettings> {
    Json(state.settings().snapshot())
}

/// Replace the live settings. Invalid settings leave the current ones in place.
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<PipelineSettings>,
) -> Result<Json<PipelineSettings>, ApiError> {
    state
        .settings()
        .replace(settings)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let current = state.settings().snapshot();
    info!(
        "Settings updated: downloads={} uploads={} prefetch={} backups={} shutdown_when_finished={}",
        current.max_concurrent_downloads,
        current.max_concurrent_uploads,
        current.max_prefetch_files,
        current.create_backups,
        current.shutdown_when_finished
    );
    Ok(Json(current))
}
