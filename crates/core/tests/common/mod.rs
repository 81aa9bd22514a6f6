//! Shared harness for pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use recast_core::config::{LiveSettings, PipelineSettings, SettingsProvider};
use recast_core::encoder::Encoder;
use recast_core::job::{Job, JobStatus, JobStore, SqliteJobStore};
use recast_core::probe::MediaProbe;
use recast_core::scheduler::{EnqueueRequest, PipelineScheduler};
use recast_core::testing::fixtures::{fast_scheduler_config, fast_settings};
use recast_core::testing::{MockEncoder, MockProbe, MockTransfer};
use recast_core::transfer::Transfer;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Scheduler wired to mock collaborators and an in-memory store.
pub struct TestHarness {
    pub scheduler: PipelineScheduler,
    pub store: Arc<SqliteJobStore>,
    pub transfer: Arc<MockTransfer>,
    pub encoder: Arc<MockEncoder>,
    pub probe: Arc<MockProbe>,
    pub settings: Arc<LiveSettings>,
    pub work_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(fast_settings())
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        let work_dir = TempDir::new().expect("Failed to create work dir");
        let store = Arc::new(SqliteJobStore::in_memory().expect("Failed to create job store"));
        let transfer = Arc::new(MockTransfer::new());
        let encoder = Arc::new(MockEncoder::new());
        let probe = Arc::new(MockProbe::new());
        let settings = Arc::new(LiveSettings::new(settings));

        let scheduler = PipelineScheduler::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::clone(&transfer) as Arc<dyn Transfer>,
            Arc::clone(&encoder) as Arc<dyn Encoder>,
            Arc::clone(&probe) as Arc<dyn MediaProbe>,
            Arc::clone(&settings) as Arc<dyn SettingsProvider>,
            fast_scheduler_config(),
            work_dir.path().to_path_buf(),
        );

        Self {
            scheduler,
            store,
            transfer,
            encoder,
            probe,
            settings,
            work_dir,
        }
    }

    pub async fn start(&self) {
        self.scheduler.start().await.expect("Failed to start scheduler");
    }

    /// Original content placed on the mock remote for `path`.
    pub fn original_contents(path: &str) -> Vec<u8> {
        format!("original:{}", path).into_bytes()
    }

    /// Put a file on the mock remote and enqueue it.
    pub async fn enqueue(&self, path: &str) -> Job {
        self.enqueue_request(EnqueueRequest::new(path)).await
    }

    pub async fn enqueue_request(&self, request: EnqueueRequest) -> Job {
        self.transfer
            .put_file(&request.remote_path, &Self::original_contents(&request.remote_path))
            .await;
        self.scheduler
            .enqueue(request)
            .await
            .expect("Failed to enqueue")
    }

    pub fn job(&self, id: &str) -> Job {
        self.store
            .get(id)
            .expect("Store error")
            .expect("Job not found")
    }

    /// Wait until the job reaches `status`.
    pub async fn wait_for(&self, id: &str, status: JobStatus) -> Job {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let job = self.job(id);
            if job.status == status {
                return job;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "job {} never reached {} (stuck in {}, error: {:?})",
                    id, status, job.status, job.error
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until every listed job is Completed.
    pub async fn wait_all_completed(&self, ids: &[String]) {
        for id in ids {
            self.wait_for(id, JobStatus::Completed).await;
        }
    }
}
