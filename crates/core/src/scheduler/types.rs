//! Types for the pipeline scheduler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::RestoreError;
use crate::job::{Job, StoreError};
use crate::probe::ProbeError;
use crate::progress::JobProgress;

/// Errors returned by scheduler commands.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error("invalid remote path: {0}")]
    InvalidPath(String),
}

/// Request to add a remote file to the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub remote_path: String,
    /// Per-job approval gate. Falls back to the live setting when absent.
    #[serde(default)]
    pub pause_before_upload: Option<bool>,
}

impl EnqueueRequest {
    pub fn new(remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            pause_before_upload: None,
        }
    }

    pub fn with_pause_before_upload(mut self, pause: bool) -> Self {
        self.pause_before_upload = Some(pause);
        self
    }
}

/// A job together with its live progress, if it is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

/// Occupancy of one stage pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolStatus {
    pub name: String,
    pub active_jobs: usize,
    pub max_concurrent: usize,
    /// Jobs waiting in the stage's holding status.
    pub queued_jobs: usize,
}

/// Queue state, computed on read from the store and the admission counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub running: bool,
    /// Job count per status name.
    pub counts: BTreeMap<String, i64>,
    pub download_pool: PoolStatus,
    pub encode_pool: PoolStatus,
    pub upload_pool: PoolStatus,
    /// Jobs downloading, ready to encode or encoding.
    pub resident_jobs: i64,
    pub max_prefetch_files: usize,
    /// Jobs not yet in a terminal status.
    pub active_jobs: i64,
}
