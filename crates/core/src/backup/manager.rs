//! Upload finalization and restore.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::naming::{backup_path_for, encoded_path_for, staging_path_for};
use super::types::{FinalizedUpload, RestoreError, RestoreOutcome, RestoreSource};
use crate::config::PipelineSettings;
use crate::events::{EventBus, PipelineEvent};
use crate::job::{ErrorKind, Job, JobError, JobStatus};
use crate::metrics;
use crate::transfer::{RetryFailure, RetryPolicy, TransferStage};

/// Moves encoded files into place on the server, keeps backups of the
/// originals, and puts originals back on request.
pub struct BackupManager {
    stage: TransferStage,
    events: EventBus,
    restoring: Arc<Mutex<HashSet<String>>>,
}

/// Marks a job as being restored until dropped.
struct RestoreGuard {
    restoring: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl RestoreGuard {
    fn acquire(restoring: &Arc<Mutex<HashSet<String>>>, job_id: &str) -> Option<Self> {
        let mut set = restoring.lock().ok()?;
        if !set.insert(job_id.to_string()) {
            return None;
        }
        Some(Self {
            restoring: Arc::clone(restoring),
            job_id: job_id.to_string(),
        })
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.restoring.lock() {
            set.remove(&self.job_id);
        }
    }
}

impl BackupManager {
    pub fn new(stage: TransferStage, events: EventBus) -> Self {
        Self {
            stage,
            events,
            restoring: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a restore of `job_id` is running right now.
    pub fn is_restoring(&self, job_id: &str) -> bool {
        self.restoring
            .lock()
            .map(|set| set.contains(job_id))
            .unwrap_or(false)
    }

    /// Everything between "encoded file is local" and Completed.
    ///
    /// 1. upload to a staging name next to the target
    /// 2. rename the original to its backup name (when backups are on)
    /// 3. move the staged upload into place
    /// 4. drop a superseded original whose container changed (no backup kept)
    /// 5. apply local retention
    ///
    /// Safe to repeat after a failure at any step.
    pub async fn finalize_upload(
        &self,
        job: &Job,
        settings: &PipelineSettings,
    ) -> Result<FinalizedUpload, JobError> {
        let policy = settings.retry_policy();
        let local_encoded = job
            .local_encoded_path
            .as_deref()
            .filter(|path| path.exists())
            .ok_or_else(|| JobError::new(ErrorKind::LocalIo, "encoded file is missing locally"))?;

        let container = local_encoded
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_else(|| settings.encoding.container.clone());
        let target = encoded_path_for(&job.remote_path, &container);
        let staging = staging_path_for(&target);

        self.stage
            .upload(&job.id, local_encoded, &staging, &policy)
            .await
            .map_err(|e| e.into_job_error("upload"))?;

        let server_backup_path = if settings.create_backups {
            let backup = backup_path_for(&job.remote_path);
            self.ensure_backup(job, &backup, &policy)
                .await
                .map_err(|e| JobError::new(ErrorKind::Backup, format!("backup failed: {}", e)))?;
            Some(backup)
        } else {
            None
        };

        self.rename(&policy, &staging, &target)
            .await
            .map_err(|e| e.into_job_error("move into place"))?;

        if server_backup_path.is_none() && target != job.remote_path {
            self.remove(&policy, &job.remote_path)
                .await
                .map_err(|e| e.into_job_error("remove superseded original"))?;
        }

        let removed_local_original = if settings.keep_original {
            false
        } else {
            remove_local(job.local_original_path.as_deref()).await
        };
        let removed_local_encoded = if settings.keep_encoded {
            false
        } else {
            remove_local(Some(local_encoded)).await
        };

        info!(
            job_id = %job.id,
            target = %target,
            backup = ?server_backup_path,
            "Upload finalized"
        );

        Ok(FinalizedUpload {
            server_encoded_path: target,
            server_backup_path,
            removed_local_original,
            removed_local_encoded,
        })
    }

    /// Move the original to `backup` unless a backup is already there.
    ///
    /// An existing backup wins: after a partial earlier attempt the file at
    /// `remote_path` may already be the encoded one.
    async fn ensure_backup(
        &self,
        job: &Job,
        backup: &str,
        policy: &RetryPolicy,
    ) -> Result<(), RetryFailure> {
        if self.exists(policy, backup).await? {
            return Ok(());
        }
        if self.exists(policy, &job.remote_path).await? {
            return self.rename(policy, &job.remote_path, backup).await;
        }
        Err(RetryFailure {
            error: crate::transfer::TransferError::NotFound {
                path: job.remote_path.clone(),
            },
            attempts: 1,
        })
    }

    /// Put a completed job's original (or encoded file) back on the server.
    ///
    /// Never changes the job record. Repeating a restore leaves the server
    /// in the same state as doing it once; a repeat that finds the file
    /// already in place reports `AlreadyRestored` without uploading again.
    pub async fn restore(
        &self,
        job: &Job,
        source: RestoreSource,
        policy: &RetryPolicy,
    ) -> Result<RestoreOutcome, RestoreError> {
        if job.status != JobStatus::Completed {
            return Err(RestoreError::NotCompleted {
                job_id: job.id.clone(),
                status: job.status,
            });
        }
        let _guard =
            RestoreGuard::acquire(&self.restoring, &job.id).ok_or_else(|| {
                RestoreError::InProgress {
                    job_id: job.id.clone(),
                }
            })?;

        let result = match source {
            RestoreSource::Server => self.restore_from_server(job, policy).await,
            RestoreSource::LocalOriginal => self.restore_local_original(job, policy).await,
            RestoreSource::LocalEncoded => self.restore_local_encoded(job, policy).await,
        };

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        metrics::RESTORES_TOTAL
            .with_label_values(&[source.as_str(), label])
            .inc();

        match &result {
            Ok(outcome) => {
                info!(job_id = %job.id, source = source.as_str(), outcome = outcome.as_str(), "Restore finished");
                self.events.publish(PipelineEvent::JobRestored {
                    job_id: job.id.clone(),
                    source,
                    outcome: *outcome,
                });
            }
            Err(e) => warn!(job_id = %job.id, source = source.as_str(), error = %e, "Restore failed"),
        }
        result
    }

    async fn restore_from_server(
        &self,
        job: &Job,
        policy: &RetryPolicy,
    ) -> Result<RestoreOutcome, RestoreError> {
        let backup = job
            .server_backup_path
            .as_deref()
            .ok_or_else(|| RestoreError::NoServerBackup {
                job_id: job.id.clone(),
            })?;

        if !self.exists(policy, backup).await.map_err(transfer_failed)? {
            // A previous restore already moved the backup back.
            return if self
                .exists(policy, &job.remote_path)
                .await
                .map_err(transfer_failed)?
            {
                Ok(RestoreOutcome::AlreadyRestored)
            } else {
                Err(RestoreError::NoServerBackup {
                    job_id: job.id.clone(),
                })
            };
        }

        self.remove_superseding_encoded(job, policy).await?;
        self.rename(policy, backup, &job.remote_path)
            .await
            .map_err(transfer_failed)?;
        Ok(RestoreOutcome::Restored)
    }

    async fn restore_local_original(
        &self,
        job: &Job,
        policy: &RetryPolicy,
    ) -> Result<RestoreOutcome, RestoreError> {
        let local = existing_local(job, job.local_original_path.as_deref(), "original")?;
        if self.matches_local(policy, &job.remote_path, local).await?
            && !self.superseding_encoded_present(job, policy).await?
        {
            return Ok(RestoreOutcome::AlreadyRestored);
        }
        self.upload_into_place(job, local, &job.remote_path, policy)
            .await?;
        self.remove_superseding_encoded(job, policy).await?;
        Ok(RestoreOutcome::Restored)
    }

    async fn restore_local_encoded(
        &self,
        job: &Job,
        policy: &RetryPolicy,
    ) -> Result<RestoreOutcome, RestoreError> {
        let local = existing_local(job, job.local_encoded_path.as_deref(), "encoded")?;
        let target = job
            .server_encoded_path
            .clone()
            .unwrap_or_else(|| job.remote_path.clone());
        if self.matches_local(policy, &target, local).await? {
            return Ok(RestoreOutcome::AlreadyRestored);
        }
        self.upload_into_place(job, local, &target, policy).await?;
        Ok(RestoreOutcome::Restored)
    }

    async fn upload_into_place(
        &self,
        job: &Job,
        local: &Path,
        target: &str,
        policy: &RetryPolicy,
    ) -> Result<(), RestoreError> {
        let staging = staging_path_for(target);
        self.stage
            .upload(&job.id, local, &staging, policy)
            .await
            .map_err(transfer_failed)?;
        self.rename(policy, &staging, target)
            .await
            .map_err(transfer_failed)
    }

    /// Whether `target` on the server already has the size of the local file.
    async fn matches_local(
        &self,
        policy: &RetryPolicy,
        target: &str,
        local: &Path,
    ) -> Result<bool, RestoreError> {
        let local_size = tokio::fs::metadata(local)
            .await
            .map_err(|e| RestoreError::Transfer(format!("{}: {}", local.display(), e)))?
            .len();
        let remote_size = self.size(policy, target).await.map_err(transfer_failed)?;
        Ok(remote_size == Some(local_size))
    }

    async fn superseding_encoded_present(
        &self,
        job: &Job,
        policy: &RetryPolicy,
    ) -> Result<bool, RestoreError> {
        match job.server_encoded_path.as_deref() {
            Some(encoded) if encoded != job.remote_path => {
                self.exists(policy, encoded).await.map_err(transfer_failed)
            }
            _ => Ok(false),
        }
    }

    /// Drop the encoded file when it lives at a different path than the original.
    async fn remove_superseding_encoded(
        &self,
        job: &Job,
        policy: &RetryPolicy,
    ) -> Result<(), RestoreError> {
        match job.server_encoded_path.as_deref() {
            Some(encoded) if encoded != job.remote_path => {
                self.remove(policy, encoded).await.map_err(transfer_failed)
            }
            _ => Ok(()),
        }
    }

    async fn exists(&self, policy: &RetryPolicy, path: &str) -> Result<bool, RetryFailure> {
        self.stage
            .remote(policy, "exists", |t| async move { t.exists(path).await })
            .await
    }

    async fn size(&self, policy: &RetryPolicy, path: &str) -> Result<Option<u64>, RetryFailure> {
        self.stage
            .remote(policy, "size", |t| async move { t.size(path).await })
            .await
    }

    async fn rename(&self, policy: &RetryPolicy, from: &str, to: &str) -> Result<(), RetryFailure> {
        self.stage
            .remote(policy, "rename", |t| async move { t.rename(from, to).await })
            .await
    }

    async fn remove(&self, policy: &RetryPolicy, path: &str) -> Result<(), RetryFailure> {
        self.stage
            .remote(policy, "remove", |t| async move { t.remove(path).await })
            .await
    }
}

fn transfer_failed(e: RetryFailure) -> RestoreError {
    RestoreError::Transfer(e.to_string())
}

fn existing_local<'a>(
    job: &Job,
    path: Option<&'a Path>,
    artifact: &str,
) -> Result<&'a Path, RestoreError> {
    path.filter(|p| p.exists())
        .ok_or_else(|| RestoreError::LocalArtifactMissing {
            job_id: job.id.clone(),
            artifact: artifact.to_string(),
        })
}

/// Delete a local artifact. Returns true when the file is gone afterwards.
async fn remove_local(path: Option<&Path>) -> bool {
    let Some(path) = path else {
        return true;
    };
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove local file");
            false
        }
    }
}
