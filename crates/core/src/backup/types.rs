use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobStatus;

/// Which copy of a file a restore puts back on the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestoreSource {
    /// Move the server-side backup back over the original path.
    Server,
    /// Re-upload the original kept in the local work directory.
    LocalOriginal,
    /// Re-upload the encoded file kept in the local work directory.
    LocalEncoded,
}

impl RestoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreSource::Server => "server",
            RestoreSource::LocalOriginal => "local_original",
            RestoreSource::LocalEncoded => "local_encoded",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestoreOutcome {
    Restored,
    /// Nothing to do; the server already holds the restored file.
    AlreadyRestored,
}

impl RestoreOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreOutcome::Restored => "restored",
            RestoreOutcome::AlreadyRestored => "already_restored",
        }
    }
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("job {job_id} is {status}; only completed jobs can be restored")]
    NotCompleted { job_id: String, status: JobStatus },

    #[error("job {job_id} has no server backup")]
    NoServerBackup { job_id: String },

    #[error("job {job_id}: local {artifact} file is not available")]
    LocalArtifactMissing { job_id: String, artifact: String },

    #[error("a restore of job {job_id} is already running")]
    InProgress { job_id: String },

    #[error("restore transfer failed: {0}")]
    Transfer(String),
}

/// Result of the work done when an upload completes.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedUpload {
    pub server_encoded_path: String,
    /// Present only when backups were enabled.
    pub server_backup_path: Option<String>,
    pub removed_local_original: bool,
    pub removed_local_encoded: bool,
}
