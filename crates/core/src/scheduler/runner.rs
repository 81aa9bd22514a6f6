//! Pipeline scheduler implementation.
//!
//! Drives jobs through the stages:
//! - Download: concurrent, bounded by `max_concurrent_downloads` and the prefetch limit
//! - Encode: exclusive, one job at a time
//! - Upload: concurrent, bounded by `max_concurrent_uploads`
//!
//! A single coordinator task admits work; stage workers run as their own
//! tasks and report back only through the job store.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backup::BackupManager;
use crate::config::{PipelineSettings, SettingsProvider};
use crate::encoder::Encoder;
use crate::events::{EventBus, PipelineEvent};
use crate::job::{ErrorKind, Job, JobError, JobFilter, JobPatch, JobStatus, JobStore, StoreError};
use crate::metrics;
use crate::probe::MediaProbe;
use crate::progress::{ProgressBoard, ProgressForwarder};
use crate::transfer::{Transfer, TransferStage};

use super::admission::AdmissionCounters;
use super::config::SchedulerConfig;
use super::workers;

/// Upper bound on rows read in one scan of a status.
pub(crate) const SCAN_LIMIT: i64 = 10_000;

/// State shared by the coordinator, the workers and the command API.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) stage: TransferStage,
    pub(crate) encoder: Arc<dyn Encoder>,
    pub(crate) probe: Arc<dyn MediaProbe>,
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) backup: BackupManager,
    pub(crate) events: EventBus,
    pub(crate) board: ProgressBoard,
    pub(crate) forwarder: ProgressForwarder,
    pub(crate) counters: AdmissionCounters,
    pub(crate) work_dir: PathBuf,
    pub(crate) wake: Notify,
    pub(crate) running: AtomicBool,
}

impl Shared {
    /// The only place job status changes. Publishes the change.
    pub(crate) fn transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, StoreError> {
        let job = self.store.transition(id, from, to, patch)?;

        metrics::JOB_TRANSITIONS
            .with_label_values(&[to.as_str()])
            .inc();
        if let Some(error) = &job.error {
            metrics::JOB_FAILURES
                .with_label_values(&[error.kind.as_str()])
                .inc();
            warn!("Job {} failed in {}: {}", id, from, error);
        } else {
            info!("Job {}: {} -> {}", id, from, to);
        }

        self.events.publish(PipelineEvent::JobStatusChanged {
            job_id: id.to_string(),
            from,
            to,
            error: job.error.clone(),
        });
        Ok(job)
    }

    /// Move a job to the next stage, then honor a pause requested while it
    /// was in flight.
    pub(crate) fn advance(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, StoreError> {
        let job = self.transition(id, from, to, patch)?;
        if job.pause_requested && to.is_pausable() {
            return self.transition(id, to, JobStatus::Paused, JobPatch::new());
        }
        Ok(job)
    }

    /// Fail a job. Logs rather than returns: a worker has nobody to report to.
    pub(crate) fn fail(&self, id: &str, from: JobStatus, patch: JobPatch) {
        if let Err(e) = self.transition(id, from, JobStatus::Failed, patch) {
            error!("Could not mark job {} as failed: {}", id, e);
        }
    }

    /// Local working directory for one job.
    pub(crate) fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    /// Spawn a stage worker. A panic inside it fails the job instead of
    /// leaving it stuck in an in-flight status.
    pub(crate) fn spawn_worker<F>(self: &Arc<Self>, job_id: String, stage: JobStatus, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shared = Arc::clone(self);
        let handle = tokio::spawn(work);
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Worker for job {} panicked in {}", job_id, stage);
                    shared.fail(
                        &job_id,
                        stage,
                        JobPatch::new().with_error(JobError::new(
                            ErrorKind::LocalIo,
                            format!("{} worker panicked", stage),
                        )),
                    );
                }
            }
            shared.wake.notify_one();
        });
    }

    /// First job in `status` that has no deferred pause, by queue order.
    fn next_eligible(&self, status: JobStatus) -> Result<Option<Job>, StoreError> {
        let jobs = self
            .store
            .list(&JobFilter::new().with_status(status).with_limit(SCAN_LIMIT))?;
        Ok(jobs.into_iter().find(|job| !job.pause_requested))
    }

    /// One admission pass over all three stages.
    pub(crate) fn admit(self: &Arc<Self>) -> Result<(), StoreError> {
        let settings = self.settings.snapshot();
        self.admit_downloads(&settings)?;
        self.admit_encode()?;
        self.admit_uploads(&settings)?;
        Ok(())
    }

    fn admit_downloads(self: &Arc<Self>, settings: &PipelineSettings) -> Result<(), StoreError> {
        loop {
            let resident = self.store.count(&JobFilter::resident())?;
            if resident >= settings.max_prefetch_files as i64 {
                debug!("Prefetch limit reached ({} resident)", resident);
                return Ok(());
            }
            let Some(permit) = self
                .counters
                .try_admit_download(settings.max_concurrent_downloads)
            else {
                return Ok(());
            };
            let Some(job) = self.next_eligible(JobStatus::Waiting)? else {
                return Ok(());
            };

            match self.transition(
                &job.id,
                JobStatus::Waiting,
                JobStatus::Downloading,
                JobPatch::new(),
            ) {
                Ok(job) => {
                    let shared = Arc::clone(self);
                    self.spawn_worker(job.id.clone(), JobStatus::Downloading, async move {
                        workers::download(shared, job, permit).await
                    });
                }
                // Paused or deleted since the scan; try the next one.
                Err(StoreError::InvalidTransition { .. } | StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn admit_encode(self: &Arc<Self>) -> Result<(), StoreError> {
        loop {
            let Some(permit) = self.counters.try_admit_encode() else {
                return Ok(());
            };
            let Some(job) = self.next_eligible(JobStatus::ReadyEncode)? else {
                return Ok(());
            };

            match self.transition(
                &job.id,
                JobStatus::ReadyEncode,
                JobStatus::Encoding,
                JobPatch::new(),
            ) {
                Ok(job) => {
                    let shared = Arc::clone(self);
                    self.spawn_worker(job.id.clone(), JobStatus::Encoding, async move {
                        workers::encode(shared, job, permit).await
                    });
                    return Ok(());
                }
                Err(StoreError::InvalidTransition { .. } | StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn admit_uploads(self: &Arc<Self>, settings: &PipelineSettings) -> Result<(), StoreError> {
        loop {
            let Some(permit) = self
                .counters
                .try_admit_upload(settings.max_concurrent_uploads)
            else {
                return Ok(());
            };
            let Some(job) = self.next_eligible(JobStatus::ReadyUpload)? else {
                return Ok(());
            };

            match self.transition(
                &job.id,
                JobStatus::ReadyUpload,
                JobStatus::Uploading,
                JobPatch::new(),
            ) {
                Ok(job) => {
                    let shared = Arc::clone(self);
                    self.spawn_worker(job.id.clone(), JobStatus::Uploading, async move {
                        workers::upload(shared, job, permit).await
                    });
                }
                Err(StoreError::InvalidTransition { .. } | StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Fail jobs left in an in-flight status by a previous process.
    fn recover_interrupted(&self) -> Result<usize, StoreError> {
        let filter = JobFilter::new()
            .with_statuses(JobStatus::ALL.into_iter().filter(|s| s.is_in_flight()))
            .with_limit(SCAN_LIMIT);

        let jobs = self.store.list(&filter)?;
        let mut recovered = 0;
        for job in jobs {
            let error = JobError::new(
                ErrorKind::Interrupted,
                format!("service stopped while the job was {}", job.status),
            );
            match self.transition(
                &job.id,
                job.status,
                JobStatus::Failed,
                JobPatch::new().with_error(error),
            ) {
                Ok(_) => recovered += 1,
                Err(e) => error!("Failed to recover interrupted job {}: {}", job.id, e),
            }
        }
        Ok(recovered)
    }
}

/// The pipeline scheduler: admits jobs into stages and serves operator commands.
pub struct PipelineScheduler {
    pub(crate) shared: Arc<Shared>,
    config: SchedulerConfig,
    shutdown_tx: broadcast::Sender<()>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineScheduler {
    /// Create a new scheduler. Nothing runs until [`start`](Self::start).
    pub fn new(
        store: Arc<dyn JobStore>,
        transfer: Arc<dyn Transfer>,
        encoder: Arc<dyn Encoder>,
        probe: Arc<dyn MediaProbe>,
        settings: Arc<dyn SettingsProvider>,
        config: SchedulerConfig,
        work_dir: PathBuf,
    ) -> Self {
        let events = EventBus::new(config.event_buffer);
        let board = ProgressBoard::new();
        let forwarder = ProgressForwarder::new(
            events.clone(),
            board.clone(),
            Duration::from_millis(config.progress_interval_ms),
        );
        let stage = TransferStage::new(transfer, forwarder.clone());
        let backup = BackupManager::new(stage.clone(), events.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            store,
            stage,
            encoder,
            probe,
            settings,
            backup,
            events,
            board,
            forwarder,
            counters: AdmissionCounters::new(),
            work_dir,
            wake: Notify::new(),
            running: AtomicBool::new(false),
        });

        Self {
            shared,
            config,
            shutdown_tx,
            coordinator: Mutex::new(None),
        }
    }

    /// Recover interrupted jobs and start the coordinator loop.
    pub async fn start(&self) -> Result<(), StoreError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return Ok(());
        }

        info!("Starting pipeline scheduler");

        let recovered = self.shared.recover_interrupted()?;
        if recovered > 0 {
            info!("Marked {} interrupted jobs as failed", recovered);
        }

        let shared = Arc::clone(&self.shared);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Scheduler loop started");
            loop {
                if let Err(e) = shared.admit() {
                    error!("Admission pass failed: {}", e);
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scheduler loop received shutdown signal");
                        break;
                    }
                    _ = shared.wake.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        });

        if let Ok(mut slot) = self.coordinator.lock() {
            *slot = Some(handle);
        }
        info!("Pipeline scheduler started");
        Ok(())
    }

    /// Stop admitting work. Running workers finish their current operation.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping pipeline scheduler");
        let _ = self.shutdown_tx.send(());

        let handle = self.coordinator.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Pipeline scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> EventBus {
        self.shared.events.clone()
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn settings(&self) -> Arc<dyn SettingsProvider> {
        Arc::clone(&self.shared.settings)
    }

    /// Run an admission pass soon.
    pub(crate) fn wake(&self) {
        self.shared.wake.notify_one();
    }
}
