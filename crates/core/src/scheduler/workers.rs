//! Stage workers. Each runs one job through one stage and reports the
//! outcome as a status transition.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::{info, warn};

use crate::encoder::{quality_gate, EncodeProgress, EncodeRequest};
use crate::job::{
    EncodeFacts, EncodingSnapshot, ErrorKind, FieldUpdate, Job, JobError, JobPatch, JobStatus,
};
use crate::metrics;
use crate::progress::JobProgress;

use super::admission::StagePermit;
use super::runner::Shared;

const ENCODE_PROGRESS_CHANNEL_SIZE: usize = 64;

fn observe(stage: &str, result: &str, started: Instant) -> f64 {
    let secs = started.elapsed().as_secs_f64();
    metrics::STAGE_DURATION
        .with_label_values(&[stage, result])
        .observe(secs);
    secs
}

/// `<work_dir>/<job id>/<file name>`.
fn local_original_path(job_dir: &Path, remote_path: &str) -> PathBuf {
    let name = remote_path
        .rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or("source");
    job_dir.join(name)
}

/// Remove a stale local file. A missing file is not an error.
async fn discard(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

pub(crate) async fn download(shared: Arc<Shared>, job: Job, _permit: StagePermit) {
    let settings = shared.settings.snapshot();
    let job_dir = shared.job_dir(&job.id);
    let local = local_original_path(&job_dir, &job.remote_path);
    let started = Instant::now();

    if let Err(e) = tokio::fs::create_dir_all(&job_dir).await {
        observe("download", "failed", started);
        shared.fail(
            &job.id,
            JobStatus::Downloading,
            JobPatch::new().with_error(JobError::new(
                ErrorKind::LocalIo,
                format!("cannot create {}: {}", job_dir.display(), e),
            )),
        );
        return;
    }

    info!("Downloading {} for job {}", job.remote_path, job.id);
    match shared
        .stage
        .download(&job.id, &job.remote_path, &local, &settings.retry_policy())
        .await
    {
        Ok(bytes) => {
            metrics::TRANSFER_BYTES
                .with_label_values(&["download"])
                .inc_by(bytes);
            let patch = JobPatch {
                download_secs: Some(observe("download", "success", started)),
                ..JobPatch::new().with_local_original(local)
            };
            if let Err(e) =
                shared.advance(&job.id, JobStatus::Downloading, JobStatus::ReadyEncode, patch)
            {
                warn!("Job {}: download finished but status update failed: {}", job.id, e);
            }
        }
        Err(failure) => {
            observe("download", "failed", started);
            shared.fail(
                &job.id,
                JobStatus::Downloading,
                JobPatch::new().with_error(failure.into_job_error("download")),
            );
        }
    }
}

pub(crate) async fn encode(shared: Arc<Shared>, job: Job, _permit: OwnedSemaphorePermit) {
    // Parameters are fixed at encode start; later setting changes do not
    // affect this job's record.
    let settings = shared.settings.snapshot();
    let snapshot = EncodingSnapshot {
        params: settings.encoding.clone(),
        captured_at: Utc::now(),
    };
    let started = Instant::now();
    let fail = |error: JobError| {
        observe("encode", "failed", started);
        shared.fail(
            &job.id,
            JobStatus::Encoding,
            JobPatch::new()
                .with_error(error)
                .with_encoding(snapshot.clone()),
        );
    };

    let Some(input) = job.local_original_path.clone().filter(|p| p.exists()) else {
        fail(JobError::new(
            ErrorKind::LocalIo,
            "downloaded original is missing",
        ));
        return;
    };

    // A previous attempt's output must not survive into this one.
    if let Some(previous) = &job.local_encoded_path {
        if let Err(e) = discard(previous).await {
            fail(JobError::new(
                ErrorKind::LocalIo,
                format!("cannot remove previous encode {}: {}", previous.display(), e),
            ));
            return;
        }
    }

    let output_dir = input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| shared.job_dir(&job.id));
    let request = EncodeRequest {
        job_id: job.id.clone(),
        input_path: input,
        output_dir,
        params: snapshot.params.clone(),
        duration_seconds: job.media.duration_seconds,
    };

    info!("Encoding job {} with {}", job.id, shared.encoder.name());
    let (tx, rx) = mpsc::channel::<EncodeProgress>(ENCODE_PROGRESS_CHANNEL_SIZE);
    let forwarding = shared.forwarder.spawn(&job.id, rx, JobProgress::Encode);
    let result = shared.encoder.encode(request, tx).await;
    let _ = forwarding.await;
    shared.board.clear(&job.id);

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            fail(JobError::new(ErrorKind::Encoder, e.to_string()));
            return;
        }
    };

    let facts = EncodeFacts {
        codec_after: output.codec_after.clone(),
        size_after: output.size_after,
        bitrate_after: output.bitrate_after,
    };
    let patch = JobPatch::new()
        .with_encoded(facts)
        .with_local_encoded(output.output_path.clone())
        .with_encoding(snapshot.clone());

    if let Err(rejection) = quality_gate(
        job.media.size_before,
        output.size_after,
        settings.block_larger_encoded,
    ) {
        observe("encode", "failed", started);
        shared.fail(&job.id, JobStatus::Encoding, patch.with_error(rejection));
        return;
    }

    let next = if job.pause_before_upload {
        JobStatus::AwaitingApproval
    } else {
        JobStatus::ReadyUpload
    };
    let patch = JobPatch {
        encode_secs: Some(observe("encode", "success", started)),
        ..patch
    };
    if let Err(e) = shared.advance(&job.id, JobStatus::Encoding, next, patch) {
        warn!("Job {}: encode finished but status update failed: {}", job.id, e);
    }
}

pub(crate) async fn upload(shared: Arc<Shared>, job: Job, _permit: StagePermit) {
    let settings = shared.settings.snapshot();
    let started = Instant::now();

    info!("Uploading job {} to {}", job.id, job.remote_path);
    match shared.backup.finalize_upload(&job, &settings).await {
        Ok(done) => {
            if let Some(size) = job.encoded.as_ref().map(|e| e.size_after) {
                metrics::TRANSFER_BYTES
                    .with_label_values(&["upload"])
                    .inc_by(size);
            }
            let patch = JobPatch {
                server_encoded_path: FieldUpdate::Set(done.server_encoded_path),
                server_backup_path: match done.server_backup_path {
                    Some(path) => FieldUpdate::Set(path),
                    None => FieldUpdate::Clear,
                },
                local_original_path: if done.removed_local_original {
                    FieldUpdate::Clear
                } else {
                    FieldUpdate::Keep
                },
                local_encoded_path: if done.removed_local_encoded {
                    FieldUpdate::Clear
                } else {
                    FieldUpdate::Keep
                },
                upload_secs: Some(observe("upload", "success", started)),
                ..JobPatch::new()
            };
            if let Err(e) = shared.advance(&job.id, JobStatus::Uploading, JobStatus::Completed, patch)
            {
                warn!("Job {}: upload finished but status update failed: {}", job.id, e);
                return;
            }
            if done.removed_local_original && done.removed_local_encoded {
                // Best effort; the directory is empty unless something else wrote there.
                let _ = tokio::fs::remove_dir(shared.job_dir(&job.id)).await;
            }
        }
        Err(error) => {
            observe("upload", "failed", started);
            shared.fail(
                &job.id,
                JobStatus::Uploading,
                JobPatch::new().with_error(error),
            );
        }
    }
}
