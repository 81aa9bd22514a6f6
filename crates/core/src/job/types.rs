//! Job types: the persistent record of one media file moving through the pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoder::EncodingParams;

/// Pipeline position of a job.
///
/// ```text
/// Waiting -> Downloading -> ReadyEncode -> Encoding -> [AwaitingApproval] -> ReadyUpload -> Uploading -> Completed
/// ```
///
/// Failed is reachable from the three in-flight states, Paused from any
/// holding state (and AwaitingApproval).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Downloading,
    ReadyEncode,
    Encoding,
    AwaitingApproval,
    ReadyUpload,
    Uploading,
    Completed,
    Failed,
    Paused,
}

impl JobStatus {
    pub const ALL: [JobStatus; 10] = [
        JobStatus::Waiting,
        JobStatus::Downloading,
        JobStatus::ReadyEncode,
        JobStatus::Encoding,
        JobStatus::AwaitingApproval,
        JobStatus::ReadyUpload,
        JobStatus::Uploading,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Paused,
    ];

    /// Stable string form, used in the database and the HTTP API.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Downloading => "downloading",
            JobStatus::ReadyEncode => "ready_encode",
            JobStatus::Encoding => "encoding",
            JobStatus::AwaitingApproval => "awaiting_approval",
            JobStatus::ReadyUpload => "ready_upload",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Paused => "paused",
        }
    }

    /// A worker currently owns the job.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Downloading | JobStatus::Encoding | JobStatus::Uploading
        )
    }

    /// The job sits in a queue waiting for the next stage to admit it.
    pub fn is_holding(&self) -> bool {
        matches!(
            self,
            JobStatus::Waiting | JobStatus::ReadyEncode | JobStatus::ReadyUpload
        )
    }

    /// The job will not move without an operator command.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Paused
        )
    }

    /// Counts toward "work remaining" for the shutdown monitor.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Can be moved to Paused immediately.
    pub fn is_pausable(&self) -> bool {
        self.is_holding() || *self == JobStatus::AwaitingApproval
    }

    /// Can be removed from the store.
    pub fn is_deletable(&self) -> bool {
        self.is_holding() || self.is_terminal()
    }

    /// Holds (or is about to hold) a local copy of the original file.
    pub fn is_resident(&self) -> bool {
        matches!(
            self,
            JobStatus::Downloading | JobStatus::ReadyEncode | JobStatus::Encoding
        )
    }

    /// Where a retry re-enters the pipeline when a job failed in this stage.
    pub fn retry_target(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Downloading => Some(JobStatus::Waiting),
            JobStatus::Encoding => Some(JobStatus::ReadyEncode),
            JobStatus::Uploading => Some(JobStatus::ReadyUpload),
            _ => None,
        }
    }

    /// Whether the transition table allows `self -> to` at all.
    ///
    /// Pause, resume and retry are narrowed further by the job's bookkeeping
    /// (`paused_from`, `failed_from`); see [`super::rules::apply_transition`].
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        match (*self, to) {
            (Waiting, Downloading)
            | (Downloading, ReadyEncode)
            | (Downloading, Failed)
            | (ReadyEncode, Encoding)
            | (Encoding, AwaitingApproval)
            | (Encoding, ReadyUpload)
            | (Encoding, Failed)
            | (AwaitingApproval, ReadyUpload)
            | (AwaitingApproval, ReadyEncode)
            | (ReadyUpload, Uploading)
            | (Uploading, Completed)
            | (Uploading, Failed) => true,
            (Failed, to) => to.is_holding(),
            (Paused, to) => to.is_pausable(),
            (from, Paused) => from.is_pausable(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown job status: {}", s))
    }
}

/// Classification of a job failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network-level transfer failure that exhausted its retries.
    TransientTransfer,
    /// Transfer failure that retrying cannot fix (missing file, permissions).
    PermanentTransfer,
    /// The encoder failed or produced no output.
    Encoder,
    /// Output is larger than the original and the size gate is on.
    EncodedLarger,
    /// The original could not be moved to its backup location.
    Backup,
    /// The process stopped while the job was in flight.
    Interrupted,
    /// Local filesystem problem in the working directory.
    LocalIo,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientTransfer => "transient_transfer",
            ErrorKind::PermanentTransfer => "permanent_transfer",
            ErrorKind::Encoder => "encoder",
            ErrorKind::EncodedLarger => "encoded_larger",
            ErrorKind::Backup => "backup",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::LocalIo => "local_io",
        }
    }

    /// Policy outcomes are deliberate stops, not malfunctions.
    pub fn is_policy(&self) -> bool {
        matches!(self, ErrorKind::EncodedLarger)
    }
}

/// Failure recorded on a job in Failed status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Facts about the original file, captured by the probe at enqueue time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaFacts {
    pub size_before: u64,
    pub codec_before: Option<String>,
    pub container: Option<String>,
    /// e.g. "1920x1080".
    pub resolution: Option<String>,
    pub bitrate_before: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub audio_track_count: u32,
    pub subtitle_track_count: u32,
}

/// Facts about the encoded output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeFacts {
    pub codec_after: String,
    pub size_after: u64,
    pub bitrate_after: Option<u64>,
}

/// Encoding parameters frozen at the moment encoding began.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingSnapshot {
    pub params: EncodingParams,
    pub captured_at: DateTime<Utc>,
}

/// Per-stage durations in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timing {
    pub download_secs: Option<f64>,
    pub encode_secs: Option<f64>,
    pub upload_secs: Option<f64>,
    pub total_secs: Option<f64>,
}

/// One media file's trip through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    /// Location of the original on the remote server, relative to its root.
    pub remote_path: String,
    pub status: JobStatus,
    pub media: MediaFacts,
    pub encoded: Option<EncodeFacts>,
    pub local_original_path: Option<PathBuf>,
    pub local_encoded_path: Option<PathBuf>,
    pub server_encoded_path: Option<String>,
    /// Set only when backups were enabled at upload time.
    pub server_backup_path: Option<String>,
    pub encoding: Option<EncodingSnapshot>,
    pub timing: Timing,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<JobError>,
    /// Operator-initiated retries from Failed.
    pub retry_count: u32,
    /// Stop after encoding and wait for approve/reject.
    pub pause_before_upload: bool,
    /// Pause requested while in flight; applied when the stage finishes.
    pub pause_requested: bool,
    pub paused_from: Option<JobStatus>,
    pub failed_from: Option<JobStatus>,
    /// FIFO key within the current holding state.
    pub queue_seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Fresh job in Waiting.
    pub fn new(request: CreateJobRequest, queue_seq: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            remote_path: request.remote_path,
            status: JobStatus::Waiting,
            media: request.media,
            encoded: None,
            local_original_path: None,
            local_encoded_path: None,
            server_encoded_path: None,
            server_backup_path: None,
            encoding: None,
            timing: Timing::default(),
            started_at: None,
            finished_at: None,
            error: None,
            retry_count: 0,
            pause_before_upload: request.pause_before_upload,
            pause_requested: false,
            paused_from: None,
            failed_from: None,
            queue_seq,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to create a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub remote_path: String,
    pub media: MediaFacts,
    pub pause_before_upload: bool,
}

/// Tri-state update for an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> FieldUpdate<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }

    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Set(value) => *slot = Some(value),
            FieldUpdate::Clear => *slot = None,
        }
    }
}

/// Field changes carried by a status transition.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub encoded: FieldUpdate<EncodeFacts>,
    pub local_original_path: FieldUpdate<PathBuf>,
    pub local_encoded_path: FieldUpdate<PathBuf>,
    pub server_encoded_path: FieldUpdate<String>,
    pub server_backup_path: FieldUpdate<String>,
    pub encoding: FieldUpdate<EncodingSnapshot>,
    pub download_secs: Option<f64>,
    pub encode_secs: Option<f64>,
    pub upload_secs: Option<f64>,
    /// Required when entering Failed, rejected otherwise.
    pub error: Option<JobError>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, error: JobError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_local_original(mut self, path: PathBuf) -> Self {
        self.local_original_path = FieldUpdate::Set(path);
        self
    }

    pub fn with_local_encoded(mut self, path: PathBuf) -> Self {
        self.local_encoded_path = FieldUpdate::Set(path);
        self
    }

    pub fn with_encoded(mut self, facts: EncodeFacts) -> Self {
        self.encoded = FieldUpdate::Set(facts);
        self
    }

    pub fn with_encoding(mut self, snapshot: EncodingSnapshot) -> Self {
        self.encoding = FieldUpdate::Set(snapshot);
        self
    }

    /// Drop the encode output facts. The artifact path is kept so the next
    /// encode can remove the stale file.
    pub fn clear_encode_facts(mut self) -> Self {
        self.encoded = FieldUpdate::Clear;
        self
    }
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Match any of these statuses (empty = all).
    pub statuses: Vec<JobStatus>,
    pub remote_path: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    pub offset: i64,
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            statuses: Vec::new(),
            remote_path: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = Some(remote_path.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Jobs that still have pipeline work ahead of them.
    pub fn active() -> Self {
        Self::new().with_statuses(JobStatus::ALL.into_iter().filter(|s| s.is_active()))
    }

    /// Jobs counted against the prefetch limit.
    pub fn resident() -> Self {
        Self::new().with_statuses(JobStatus::ALL.into_iter().filter(|s| s.is_resident()))
    }
}
