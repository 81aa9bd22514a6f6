//! Operator commands and queries.

use std::collections::BTreeMap;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::backup::{RestoreOutcome, RestoreSource};
use crate::events::PipelineEvent;
use crate::job::{CreateJobRequest, Job, JobFilter, JobPatch, JobStatus, StoreError};
use crate::metrics;

use super::admission::MAX_CONCURRENT_ENCODES;
use super::runner::PipelineScheduler;
use super::types::{EnqueueRequest, JobView, PoolStatus, QueueStatus, SchedulerError};

/// Normalise a remote path to `/`-separated, relative, without empty segments.
fn normalize_remote_path(raw: &str) -> Result<String, SchedulerError> {
    let parts: Vec<&str> = raw
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if parts.is_empty() || parts.contains(&"..") {
        return Err(SchedulerError::InvalidPath(raw.to_string()));
    }
    Ok(parts.join("/"))
}

fn invalid_operation(job: &Job, operation: &str) -> SchedulerError {
    StoreError::InvalidOperation {
        job_id: job.id.clone(),
        status: job.status,
        operation: operation.to_string(),
    }
    .into()
}

impl PipelineScheduler {
    fn load(&self, id: &str) -> Result<Job, SchedulerError> {
        self.shared
            .store
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()).into())
    }

    /// Probe a remote file and add it to the back of the download queue.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Job, SchedulerError> {
        let remote_path = normalize_remote_path(&request.remote_path)?;
        let media = self.shared.probe.probe(&remote_path).await?;
        let pause_before_upload = request
            .pause_before_upload
            .unwrap_or_else(|| self.shared.settings.snapshot().pause_before_upload);

        let job = self.shared.store.create(CreateJobRequest {
            remote_path,
            media,
            pause_before_upload,
        })?;

        metrics::JOBS_ENQUEUED.inc();
        info!("Enqueued job {} for {}", job.id, job.remote_path);
        self.shared.events.publish(PipelineEvent::JobEnqueued {
            job_id: job.id.clone(),
            remote_path: job.remote_path.clone(),
        });
        self.wake();
        Ok(job)
    }

    /// Release an encoded job for upload.
    pub fn approve(&self, id: &str) -> Result<Job, SchedulerError> {
        let job = self.shared.transition(
            id,
            JobStatus::AwaitingApproval,
            JobStatus::ReadyUpload,
            JobPatch::new(),
        )?;
        self.wake();
        Ok(job)
    }

    /// Send an encoded job back to the encode queue.
    ///
    /// The rejected file stays referenced by the job until the next encode
    /// replaces it, so a reject that loses a race to approve or pause leaves
    /// the artifact untouched.
    pub fn reject(&self, id: &str) -> Result<Job, SchedulerError> {
        let job = self.shared.transition(
            id,
            JobStatus::AwaitingApproval,
            JobStatus::ReadyEncode,
            JobPatch::new().clear_encode_facts(),
        )?;
        info!("Rejected encode of job {}", id);
        self.wake();
        Ok(job)
    }

    /// Put a failed job back into the queue it failed out of.
    pub fn retry(&self, id: &str) -> Result<Job, SchedulerError> {
        let job = self.load(id)?;
        let target = match (job.status, job.failed_from.and_then(|s| s.retry_target())) {
            (JobStatus::Failed, Some(target)) => target,
            _ => return Err(invalid_operation(&job, "retry")),
        };

        let job = self
            .shared
            .transition(id, JobStatus::Failed, target, JobPatch::new())?;
        self.wake();
        Ok(job)
    }

    /// Pause a queued job now, or an in-flight one once its current step ends.
    ///
    /// A step finishing between the read and the write moves the job under
    /// us; the job is read again and the pause applied to where it landed.
    pub fn pause(&self, id: &str) -> Result<Job, SchedulerError> {
        match self.try_pause(id) {
            Err(SchedulerError::Store(
                StoreError::InvalidTransition { .. } | StoreError::InvalidOperation { .. },
            )) => self.try_pause(id),
            result => result,
        }
    }

    fn try_pause(&self, id: &str) -> Result<Job, SchedulerError> {
        let job = self.load(id)?;
        if job.status.is_pausable() {
            return Ok(self
                .shared
                .transition(id, job.status, JobStatus::Paused, JobPatch::new())?);
        }
        if job.status.is_in_flight() {
            info!("Job {} will pause after {}", id, job.status);
            return Ok(self
                .shared
                .store
                .set_pause_requested(id, job.status, true)?);
        }
        Err(invalid_operation(&job, "pause"))
    }

    /// Resume a paused job where it left off, or cancel a pending pause.
    pub fn resume(&self, id: &str) -> Result<Job, SchedulerError> {
        let job = self.load(id)?;
        match (job.status, job.paused_from) {
            (JobStatus::Paused, Some(target)) => {
                let job = self
                    .shared
                    .transition(id, JobStatus::Paused, target, JobPatch::new())?;
                self.wake();
                Ok(job)
            }
            (status, _) if status.is_in_flight() && job.pause_requested => {
                Ok(self.shared.store.set_pause_requested(id, status, false)?)
            }
            _ => Err(invalid_operation(&job, "resume")),
        }
    }

    /// Remove a job from the store along with its local working files.
    pub async fn delete(&self, id: &str) -> Result<Job, SchedulerError> {
        let job = self.load(id)?;
        if self.shared.backup.is_restoring(id) {
            return Err(invalid_operation(&job, "delete (restore running)"));
        }

        let job = self.shared.store.delete(id)?;
        let job_dir = self.shared.job_dir(id);
        match tokio::fs::remove_dir_all(&job_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", job_dir.display(), e),
        }

        info!("Deleted job {} ({})", id, job.remote_path);
        self.shared
            .events
            .publish(PipelineEvent::JobDeleted { job_id: id.to_string() });
        self.wake();
        Ok(job)
    }

    /// Put a completed job's original (or encoded file) back on the server.
    ///
    /// Runs outside the pipeline: no admission slot, no status change.
    pub async fn restore(
        &self,
        id: &str,
        source: RestoreSource,
    ) -> Result<RestoreOutcome, SchedulerError> {
        let job = self.load(id)?;
        let policy = self.shared.settings.snapshot().retry_policy();
        Ok(self.shared.backup.restore(&job, source, &policy).await?)
    }

    pub fn job(&self, id: &str) -> Result<JobView, SchedulerError> {
        let job = self.load(id)?;
        Ok(self.view(job))
    }

    pub fn jobs(&self, filter: &JobFilter) -> Result<Vec<JobView>, SchedulerError> {
        let jobs = self.shared.store.list(filter)?;
        Ok(jobs.into_iter().map(|job| self.view(job)).collect())
    }

    fn view(&self, job: Job) -> JobView {
        let progress = if job.status.is_in_flight() {
            self.shared.board.get(&job.id)
        } else {
            None
        };
        JobView { job, progress }
    }

    /// Queue state, derived from the store and the admission counters.
    pub fn status(&self) -> Result<QueueStatus, SchedulerError> {
        let store = &self.shared.store;
        let settings = self.shared.settings.snapshot();
        let admission = self.shared.counters.snapshot();

        let mut counts = BTreeMap::new();
        for status in JobStatus::ALL {
            counts.insert(
                status.as_str().to_string(),
                store.count(&JobFilter::new().with_status(status))?,
            );
        }
        let queued = |status: JobStatus| {
            counts.get(status.as_str()).copied().unwrap_or(0) as usize
        };

        let download_pool = PoolStatus {
            name: "download".to_string(),
            active_jobs: admission.active_downloads,
            max_concurrent: settings.max_concurrent_downloads,
            queued_jobs: queued(JobStatus::Waiting),
        };
        let encode_pool = PoolStatus {
            name: "encode".to_string(),
            active_jobs: admission.active_encodes,
            max_concurrent: MAX_CONCURRENT_ENCODES,
            queued_jobs: queued(JobStatus::ReadyEncode),
        };
        let upload_pool = PoolStatus {
            name: "upload".to_string(),
            active_jobs: admission.active_uploads,
            max_concurrent: settings.max_concurrent_uploads,
            queued_jobs: queued(JobStatus::ReadyUpload),
        };

        Ok(QueueStatus {
            running: self.is_running(),
            download_pool,
            encode_pool,
            upload_pool,
            resident_jobs: store.count(&JobFilter::resident())?,
            max_prefetch_files: settings.max_prefetch_files,
            active_jobs: store.count(&JobFilter::active())?,
            counts,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_remote_path() {
        assert_eq!(
            normalize_remote_path("/movies//Heat/./Heat.mkv").unwrap(),
            "movies/Heat/Heat.mkv"
        );
        assert_eq!(normalize_remote_path("a\\b.avi").unwrap(), "a/b.avi");
        assert!(normalize_remote_path("movies/../etc/passwd").is_err());
        assert!(normalize_remote_path("/").is_err());
    }
}
