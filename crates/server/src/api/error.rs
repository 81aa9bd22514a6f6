//! Mapping of scheduler errors onto HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use recast_core::{RestoreError, SchedulerError, StoreError};

/// Error body returned by every handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn status_for(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        SchedulerError::Store(
            StoreError::InvalidTransition { .. }
            | StoreError::InvalidOperation { .. }
            | StoreError::Duplicate { .. },
        ) => StatusCode::CONFLICT,
        SchedulerError::Restore(RestoreError::Transfer(_)) => StatusCode::BAD_GATEWAY,
        SchedulerError::Restore(_) => StatusCode::CONFLICT,
        SchedulerError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        SchedulerError::Probe(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SchedulerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SchedulerError> for ErrorResponse {
    fn from(err: SchedulerError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Convert a scheduler error into a status code and JSON body.
pub fn scheduler_error(err: SchedulerError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    (status, Json(ErrorResponse::from(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_core::JobStatus;

    #[test]
    fn test_status_mapping() {
        let not_found = SchedulerError::Store(StoreError::NotFound("x".to_string()));
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);

        let conflict = SchedulerError::Store(StoreError::InvalidOperation {
            job_id: "x".to_string(),
            status: JobStatus::Waiting,
            operation: "retry".to_string(),
        });
        assert_eq!(status_for(&conflict), StatusCode::CONFLICT);

        let restore = SchedulerError::Restore(RestoreError::NoServerBackup {
            job_id: "x".to_string(),
        });
        assert_eq!(status_for(&restore), StatusCode::CONFLICT);

        let path = SchedulerError::InvalidPath("../etc".to_string());
        assert_eq!(status_for(&path), StatusCode::BAD_REQUEST);

        let db = SchedulerError::Store(StoreError::Database("locked".to_string()));
        assert_eq!(status_for(&db), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
