//! Job storage trait and errors.

use thiserror::Error;

use super::{CreateJobRequest, Job, JobFilter, JobPatch, JobStatus};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {job_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("cannot {operation} job {job_id}: current status is {status}")]
    InvalidOperation {
        job_id: String,
        status: JobStatus,
        operation: String,
    },

    #[error("job {job_id}: {reason}")]
    InvalidPatch { job_id: String, reason: String },

    #[error("{remote_path} is already queued as job {job_id}")]
    Duplicate {
        remote_path: String,
        job_id: String,
    },

    #[error("database error: {0}")]
    Database(String),
}

/// Trait for job storage backends.
///
/// Every status change goes through [`JobStore::transition`], which checks
/// the expected current status and the transition rules atomically.
pub trait JobStore: Send + Sync {
    /// Create a job in Waiting at the back of the queue.
    fn create(&self, request: CreateJobRequest) -> Result<Job, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// List jobs matching the filter, oldest queue position first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;

    fn count(&self, filter: &JobFilter) -> Result<i64, StoreError>;

    /// Move a job from `expected` to `to`, applying `patch` in the same step.
    fn transition(
        &self,
        id: &str,
        expected: JobStatus,
        to: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, StoreError>;

    /// Set or clear the deferred pause flag on a job still in `expected`.
    fn set_pause_requested(
        &self,
        id: &str,
        expected: JobStatus,
        requested: bool,
    ) -> Result<Job, StoreError>;

    /// Permanently remove a job. Returns the deleted job.
    fn delete(&self, id: &str) -> Result<Job, StoreError>;
}
