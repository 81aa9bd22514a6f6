//! Transition rules shared by every store backend.

use chrono::{DateTime, Utc};

use super::{Job, JobPatch, JobStatus, StoreError};

/// Compute the job that results from moving `job` to `to` with `patch`.
///
/// `next_seq` is the queue sequence to stamp when the job newly enters a
/// holding state. Pure; the caller persists the result.
pub fn apply_transition(
    job: &Job,
    to: JobStatus,
    patch: JobPatch,
    next_seq: i64,
    now: DateTime<Utc>,
) -> Result<Job, StoreError> {
    let from = job.status;
    let invalid = || StoreError::InvalidTransition {
        job_id: job.id.clone(),
        from,
        to,
    };

    if !from.can_transition_to(to) {
        return Err(invalid());
    }
    if from == JobStatus::Paused && job.paused_from != Some(to) {
        return Err(invalid());
    }
    if from == JobStatus::Failed && job.failed_from.and_then(|s| s.retry_target()) != Some(to) {
        return Err(invalid());
    }
    if !patch.encoding.is_keep() && from != JobStatus::Encoding {
        return Err(StoreError::InvalidPatch {
            job_id: job.id.clone(),
            reason: "encoding snapshot can only change when leaving encoding".to_string(),
        });
    }
    match (to == JobStatus::Failed, patch.error.is_some()) {
        (true, false) => {
            return Err(StoreError::InvalidPatch {
                job_id: job.id.clone(),
                reason: "failed status requires an error".to_string(),
            })
        }
        (false, true) => {
            return Err(StoreError::InvalidPatch {
                job_id: job.id.clone(),
                reason: "error can only be set when failing".to_string(),
            })
        }
        _ => {}
    }

    let mut next = job.clone();
    let JobPatch {
        encoded,
        local_original_path,
        local_encoded_path,
        server_encoded_path,
        server_backup_path,
        encoding,
        download_secs,
        encode_secs,
        upload_secs,
        error,
    } = patch;

    encoded.apply(&mut next.encoded);
    local_original_path.apply(&mut next.local_original_path);
    local_encoded_path.apply(&mut next.local_encoded_path);
    server_encoded_path.apply(&mut next.server_encoded_path);
    server_backup_path.apply(&mut next.server_backup_path);
    encoding.apply(&mut next.encoding);
    if download_secs.is_some() {
        next.timing.download_secs = download_secs;
    }
    if encode_secs.is_some() {
        next.timing.encode_secs = encode_secs;
    }
    if upload_secs.is_some() {
        next.timing.upload_secs = upload_secs;
    }

    match from {
        JobStatus::Paused => next.paused_from = None,
        JobStatus::Failed => {
            next.retry_count += 1;
            next.error = None;
            next.failed_from = None;
            next.finished_at = None;
        }
        _ => {}
    }

    match to {
        JobStatus::Downloading if next.started_at.is_none() => next.started_at = Some(now),
        JobStatus::Paused => {
            next.paused_from = Some(from);
            next.pause_requested = false;
        }
        JobStatus::Failed => {
            next.error = error;
            next.failed_from = Some(from);
            next.finished_at = Some(now);
            next.pause_requested = false;
        }
        JobStatus::Completed => {
            next.finished_at = Some(now);
            next.pause_requested = false;
            next.timing.total_secs = next
                .started_at
                .map(|started| (now - started).num_milliseconds() as f64 / 1000.0);
        }
        _ => {}
    }

    if to.is_holding() && from != JobStatus::Paused {
        next.queue_seq = next_seq;
    }

    next.status = to;
    next.updated_at = now;
    Ok(next)
}
