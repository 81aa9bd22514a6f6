//! Pipeline lifecycle integration tests.
//!
//! These tests drive the scheduler with mock transfer, encoder and probe:
//! - Full download -> encode -> upload runs, with and without backups
//! - Retry behavior for transient and permanent transfer failures
//! - Quality gate and approval gate
//! - Concurrency, prefetch and FIFO admission
//! - Pause, resume, delete and start-up recovery

mod common;

use std::time::Duration;

use common::TestHarness;
use recast_core::config::{PipelineSettings, SettingsProvider};
use recast_core::events::PipelineEvent;
use recast_core::job::{ErrorKind, JobFilter, JobPatch, JobStatus, JobStore, StoreError};
use recast_core::progress::JobProgress;
use recast_core::scheduler::{EnqueueRequest, SchedulerError};
use recast_core::testing::fixtures::fast_settings;
use recast_core::testing::MockFailure;

fn settings(edit: impl FnOnce(&mut PipelineSettings)) -> PipelineSettings {
    let mut settings = fast_settings();
    edit(&mut settings);
    settings
}

// =============================================================================
// Full runs
// =============================================================================

#[tokio::test]
async fn test_job_completes_with_backup() {
    let harness = TestHarness::new();
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    assert_eq!(job.status, JobStatus::Waiting);
    assert_eq!(job.media.size_before, 1_000_000_000);

    let job = harness.wait_for(&job.id, JobStatus::Completed).await;

    assert_eq!(job.server_encoded_path.as_deref(), Some("movies/Heat.mkv"));
    assert_eq!(
        job.server_backup_path.as_deref(),
        Some("movies/Heat.backup.mkv")
    );
    assert_eq!(
        harness.transfer.file("movies/Heat.mkv").await.unwrap(),
        b"encoded-1"
    );
    assert_eq!(
        harness.transfer.file("movies/Heat.backup.mkv").await.unwrap(),
        TestHarness::original_contents("movies/Heat.mkv")
    );
    assert!(!harness.transfer.has_file("movies/Heat.mkv.partial").await);

    let encoded = job.encoded.clone().expect("encode facts");
    assert_eq!(encoded.codec_after, "hevc");
    assert_eq!(encoded.size_after, 500_000_000);
    assert!(job.encoding.is_some());
    assert_eq!(job.retry_count, 0);
    assert!(job.error.is_none());
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
    assert!(job.timing.download_secs.is_some());
    assert!(job.timing.encode_secs.is_some());
    assert!(job.timing.upload_secs.is_some());

    // Local files are not retained by default.
    assert!(job.local_original_path.is_none());
    assert!(job.local_encoded_path.is_none());
}

#[tokio::test]
async fn test_job_completes_without_backup() {
    let harness = TestHarness::with_settings(settings(|s| s.create_backups = false));
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let job = harness.wait_for(&job.id, JobStatus::Completed).await;

    assert!(job.server_backup_path.is_none());
    assert_eq!(harness.transfer.paths().await, vec!["movies/Heat.mkv"]);
    assert_eq!(
        harness.transfer.file("movies/Heat.mkv").await.unwrap(),
        b"encoded-1"
    );
}

#[tokio::test]
async fn test_container_change_replaces_original() {
    let harness = TestHarness::with_settings(settings(|s| s.create_backups = false));
    harness.start().await;

    let job = harness.enqueue("shows/pilot.avi").await;
    let job = harness.wait_for(&job.id, JobStatus::Completed).await;

    assert_eq!(job.server_encoded_path.as_deref(), Some("shows/pilot.mkv"));
    assert_eq!(harness.transfer.paths().await, vec!["shows/pilot.mkv"]);
}

#[tokio::test]
async fn test_local_retention() {
    let harness = TestHarness::with_settings(settings(|s| {
        s.keep_original = true;
        s.keep_encoded = true;
    }));
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let job = harness.wait_for(&job.id, JobStatus::Completed).await;

    let original = job.local_original_path.expect("original kept");
    let encoded = job.local_encoded_path.expect("encoded kept");
    assert_eq!(
        std::fs::read(&original).unwrap(),
        TestHarness::original_contents("movies/Heat.mkv")
    );
    assert_eq!(std::fs::read(&encoded).unwrap(), b"encoded-1");
}

#[tokio::test]
async fn test_status_events_in_order() {
    let harness = TestHarness::new();
    let mut events = harness.scheduler.subscribe();
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    harness.wait_for(&job.id, JobStatus::Completed).await;

    let mut transitions = Vec::new();
    let mut saw_progress = false;
    let mut saw_enqueued = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::JobEnqueued { job_id, .. } if job_id == job.id => saw_enqueued = true,
            PipelineEvent::JobStatusChanged { from, to, .. } => transitions.push((from, to)),
            PipelineEvent::JobProgress { job_id, .. } if job_id == job.id => saw_progress = true,
            _ => {}
        }
    }

    use JobStatus::*;
    assert!(saw_enqueued);
    assert!(saw_progress);
    assert_eq!(
        transitions,
        vec![
            (Waiting, Downloading),
            (Downloading, ReadyEncode),
            (ReadyEncode, Encoding),
            (Encoding, ReadyUpload),
            (ReadyUpload, Uploading),
            (Uploading, Completed),
        ]
    );
}

// =============================================================================
// Failures and retries
// =============================================================================

#[tokio::test]
async fn test_transient_download_failures_are_retried_internally() {
    let harness = TestHarness::with_settings(settings(|s| s.retry_attempts = 2));
    harness
        .transfer
        .fail_downloads(2, MockFailure::Transient)
        .await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let job = harness.wait_for(&job.id, JobStatus::Completed).await;

    assert_eq!(harness.transfer.download_calls(), 3);
    assert_eq!(job.retry_count, 0);
}

#[tokio::test]
async fn test_exhausted_retries_fail_job() {
    let harness = TestHarness::with_settings(settings(|s| s.retry_attempts = 1));
    harness
        .transfer
        .fail_downloads(5, MockFailure::Transient)
        .await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let job = harness.wait_for(&job.id, JobStatus::Failed).await;

    assert_eq!(harness.transfer.download_calls(), 2);
    assert_eq!(job.failed_from, Some(JobStatus::Downloading));
    assert_eq!(
        job.error.map(|e| e.kind),
        Some(ErrorKind::TransientTransfer)
    );
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let harness = TestHarness::with_settings(settings(|s| s.retry_attempts = 3));
    harness
        .transfer
        .fail_downloads(1, MockFailure::Permanent)
        .await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let job = harness.wait_for(&job.id, JobStatus::Failed).await;

    assert_eq!(harness.transfer.download_calls(), 1);
    assert_eq!(
        job.error.map(|e| e.kind),
        Some(ErrorKind::PermanentTransfer)
    );
}

#[tokio::test]
async fn test_operator_retry_increments_retry_count() {
    let harness = TestHarness::with_settings(settings(|s| s.retry_attempts = 0));
    harness
        .transfer
        .fail_downloads(1, MockFailure::Permanent)
        .await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    harness.wait_for(&job.id, JobStatus::Failed).await;

    let retried = harness.scheduler.retry(&job.id).unwrap();
    assert_eq!(retried.status, JobStatus::Waiting);
    assert_eq!(retried.retry_count, 1);
    assert!(retried.error.is_none());

    let job = harness.wait_for(&job.id, JobStatus::Completed).await;
    assert_eq!(job.retry_count, 1);
}

#[tokio::test]
async fn test_retry_requires_failed_job() {
    let harness = TestHarness::new();
    let job = harness.enqueue("movies/Heat.mkv").await;

    let err = harness.scheduler.retry(&job.id).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Store(StoreError::InvalidOperation { .. })
    ));
}

#[tokio::test]
async fn test_encoder_failure_then_retry_reencodes() {
    let harness = TestHarness::new();
    harness.encoder.fail_next(1).await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let failed = harness.wait_for(&job.id, JobStatus::Failed).await;
    assert_eq!(failed.failed_from, Some(JobStatus::Encoding));
    assert_eq!(failed.error.map(|e| e.kind), Some(ErrorKind::Encoder));

    let retried = harness.scheduler.retry(&job.id).unwrap();
    assert_eq!(retried.status, JobStatus::ReadyEncode);

    harness.wait_for(&job.id, JobStatus::Completed).await;
    assert_eq!(harness.transfer.download_calls(), 1);
    assert_eq!(harness.encoder.encode_count().await, 2);
}

#[tokio::test]
async fn test_quality_gate_blocks_larger_output() {
    let harness = TestHarness::new();
    harness.encoder.set_size_after(1_200_000_000).await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let job = harness.wait_for(&job.id, JobStatus::Failed).await;

    let error = job.error.expect("error recorded");
    assert_eq!(error.kind, ErrorKind::EncodedLarger);
    assert!(error.kind.is_policy());
    assert_eq!(job.failed_from, Some(JobStatus::Encoding));
    assert_eq!(job.encoded.map(|e| e.size_after), Some(1_200_000_000));
    assert!(job.encoding.is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.transfer.upload_calls(), 0);
    assert_eq!(
        harness.transfer.file("movies/Heat.mkv").await.unwrap(),
        TestHarness::original_contents("movies/Heat.mkv")
    );
}

#[tokio::test]
async fn test_quality_gate_disabled() {
    let harness = TestHarness::with_settings(settings(|s| s.block_larger_encoded = false));
    harness.encoder.set_size_after(1_200_000_000).await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    harness.wait_for(&job.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_backup_failure_fails_upload_and_retry_recovers() {
    let harness = TestHarness::new();
    harness.transfer.fail_renames_from("movies/Heat.mkv").await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    let failed = harness.wait_for(&job.id, JobStatus::Failed).await;

    assert_eq!(failed.failed_from, Some(JobStatus::Uploading));
    assert_eq!(failed.error.map(|e| e.kind), Some(ErrorKind::Backup));
    // The original was not overwritten.
    assert_eq!(
        harness.transfer.file("movies/Heat.mkv").await.unwrap(),
        TestHarness::original_contents("movies/Heat.mkv")
    );

    harness.transfer.clear_failures().await;
    harness.scheduler.retry(&failed.id).unwrap();
    let job = harness.wait_for(&job.id, JobStatus::Completed).await;

    assert_eq!(
        job.server_backup_path.as_deref(),
        Some("movies/Heat.backup.mkv")
    );
    assert_eq!(
        harness.transfer.paths().await,
        vec!["movies/Heat.backup.mkv", "movies/Heat.mkv"]
    );
}

#[tokio::test]
async fn test_one_failure_does_not_block_others() {
    let harness = TestHarness::with_settings(settings(|s| s.retry_attempts = 0));
    harness.start().await;

    harness.probe.set_missing("movies/missing.mkv").await;
    let err = harness
        .scheduler
        .enqueue(EnqueueRequest::new("movies/missing.mkv"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Probe(_)));

    harness
        .transfer
        .fail_downloads(1, MockFailure::Permanent)
        .await;
    let bad = harness.enqueue("movies/a.mkv").await;
    harness.wait_for(&bad.id, JobStatus::Failed).await;

    let good = harness.enqueue("movies/b.mkv").await;
    harness.wait_for(&good.id, JobStatus::Completed).await;
}

// =============================================================================
// Approval gate
// =============================================================================

#[tokio::test]
async fn test_approval_gate() {
    let harness = TestHarness::new();
    harness.start().await;

    let job = harness
        .enqueue_request(EnqueueRequest::new("movies/Heat.mkv").with_pause_before_upload(true))
        .await;
    let job = harness.wait_for(&job.id, JobStatus::AwaitingApproval).await;
    assert!(job.encoded.is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.job(&job.id).status, JobStatus::AwaitingApproval);
    assert_eq!(harness.transfer.upload_calls(), 0);

    harness.scheduler.approve(&job.id).unwrap();
    harness.wait_for(&job.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_approval_gate_from_live_setting() {
    let harness = TestHarness::with_settings(settings(|s| s.pause_before_upload = true));
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    assert!(job.pause_before_upload);
    harness.wait_for(&job.id, JobStatus::AwaitingApproval).await;

    let explicit = harness
        .enqueue_request(EnqueueRequest::new("movies/Ronin.mkv").with_pause_before_upload(false))
        .await;
    harness.wait_for(&explicit.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_reject_discards_encode_before_reencoding() {
    let harness = TestHarness::new();
    harness.start().await;

    let job = harness
        .enqueue_request(EnqueueRequest::new("movies/Heat.mkv").with_pause_before_upload(true))
        .await;
    let job = harness.wait_for(&job.id, JobStatus::AwaitingApproval).await;
    let first_output = job.local_encoded_path.clone().expect("encoded output");
    assert_eq!(std::fs::read(&first_output).unwrap(), b"encoded-1");

    // Slow the next encode down so the gap after reject is observable.
    harness.encoder.set_delay(Duration::from_millis(300)).await;
    let rejected = harness.scheduler.reject(&job.id).unwrap();
    assert_eq!(rejected.status, JobStatus::ReadyEncode);
    assert!(rejected.encoded.is_none());
    assert_eq!(rejected.local_encoded_path.as_ref(), Some(&first_output));

    // The re-encode removes the stale output before it starts writing.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while first_output.exists() {
        assert!(tokio::time::Instant::now() < deadline, "stale encode never removed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let job = harness.wait_for(&job.id, JobStatus::AwaitingApproval).await;
    let second_output = job.local_encoded_path.clone().expect("encoded output");
    assert_eq!(std::fs::read(&second_output).unwrap(), b"encoded-2");
    assert_eq!(harness.encoder.encode_count().await, 2);
    assert_eq!(harness.transfer.download_calls(), 1);
}

#[tokio::test]
async fn test_reject_requires_awaiting_approval() {
    let harness = TestHarness::new();
    let job = harness.enqueue("movies/Heat.mkv").await;
    assert!(harness.scheduler.reject(&job.id).is_err());
    assert!(harness.scheduler.approve(&job.id).is_err());
}

#[tokio::test]
async fn test_encoding_snapshot_survives_settings_change() {
    let harness = TestHarness::new();
    harness.start().await;

    let job = harness
        .enqueue_request(EnqueueRequest::new("movies/Heat.mkv").with_pause_before_upload(true))
        .await;
    harness.wait_for(&job.id, JobStatus::AwaitingApproval).await;

    harness
        .settings
        .update(|s| s.encoding.crf = Some(30))
        .unwrap();
    harness.scheduler.approve(&job.id).unwrap();
    let job = harness.wait_for(&job.id, JobStatus::Completed).await;

    let snapshot = job.encoding.expect("snapshot");
    assert_eq!(snapshot.params.crf, Some(24));
    assert_eq!(harness.settings.snapshot().encoding.crf, Some(30));

    let requests = harness.encoder.requests().await;
    assert_eq!(requests[0].params, snapshot.params);
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn test_concurrency_limits() {
    let harness = TestHarness::with_settings(settings(|s| {
        s.max_concurrent_downloads = 2;
        s.max_concurrent_uploads = 1;
        s.max_prefetch_files = 10;
    }));
    harness.transfer.set_delay(Duration::from_millis(30)).await;
    harness.encoder.set_delay(Duration::from_millis(20)).await;
    harness.start().await;

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(harness.enqueue(&format!("movies/{}.mkv", i)).await.id);
    }
    harness.wait_all_completed(&ids).await;

    assert!(harness.transfer.peak_downloads() <= 2);
    assert_eq!(harness.transfer.peak_downloads(), 2);
    assert_eq!(harness.transfer.peak_uploads(), 1);
    assert_eq!(harness.encoder.peak_concurrency(), 1);
}

#[tokio::test]
async fn test_prefetch_limit_bounds_resident_jobs() {
    let harness = TestHarness::with_settings(settings(|s| {
        s.max_concurrent_downloads = 3;
        s.max_prefetch_files = 2;
    }));
    harness.encoder.set_delay(Duration::from_millis(100)).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(harness.enqueue(&format!("movies/{}.mkv", i)).await.id);
    }
    harness.start().await;

    let mut peak = 0;
    let mut third_waited = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let resident = harness.store.count(&JobFilter::resident()).unwrap();
        peak = peak.max(resident);
        if resident == 2 && harness.job(&ids[2]).status == JobStatus::Waiting {
            third_waited = true;
        }
        let done = harness
            .store
            .count(&JobFilter::new().with_status(JobStatus::Completed))
            .unwrap();
        if done == 3 || tokio::time::Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    harness.wait_all_completed(&ids).await;
    assert!(peak <= 2, "resident peak was {}", peak);
    assert!(third_waited);
}

#[tokio::test]
async fn test_encode_admission_is_fifo() {
    let harness = TestHarness::with_settings(settings(|s| s.max_concurrent_downloads = 1));

    let mut ids = Vec::new();
    for name in ["c", "a", "b"] {
        ids.push(harness.enqueue(&format!("movies/{}.mkv", name)).await.id);
    }
    harness.start().await;
    harness.wait_all_completed(&ids).await;

    let order: Vec<String> = harness
        .encoder
        .requests()
        .await
        .into_iter()
        .map(|r| r.job_id)
        .collect();
    assert_eq!(order, ids);
}

#[tokio::test]
async fn test_queue_status_is_derived() {
    let harness = TestHarness::new();
    let job = harness.enqueue("movies/Heat.mkv").await;

    let status = harness.scheduler.status().unwrap();
    assert!(!status.running);
    assert_eq!(status.counts["waiting"], 1);
    assert_eq!(status.download_pool.queued_jobs, 1);
    assert_eq!(status.download_pool.active_jobs, 0);
    assert_eq!(status.encode_pool.max_concurrent, 1);
    assert_eq!(status.active_jobs, 1);

    harness.start().await;
    harness.wait_for(&job.id, JobStatus::Completed).await;

    let status = harness.scheduler.status().unwrap();
    assert!(status.running);
    assert_eq!(status.counts["completed"], 1);
    assert_eq!(status.active_jobs, 0);
}

// =============================================================================
// Pause, resume, delete
// =============================================================================

#[tokio::test]
async fn test_pause_queued_job() {
    let harness = TestHarness::new();
    let paused = harness.enqueue("movies/a.mkv").await;
    let other = harness.enqueue("movies/b.mkv").await;

    let job = harness.scheduler.pause(&paused.id).unwrap();
    assert_eq!(job.status, JobStatus::Paused);
    assert_eq!(job.paused_from, Some(JobStatus::Waiting));

    harness.start().await;
    harness.wait_for(&other.id, JobStatus::Completed).await;
    assert_eq!(harness.job(&paused.id).status, JobStatus::Paused);

    let job = harness.scheduler.resume(&paused.id).unwrap();
    assert_eq!(job.status, JobStatus::Waiting);
    harness.wait_for(&paused.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_pause_in_flight_is_deferred() {
    let harness = TestHarness::new();
    harness.transfer.set_delay(Duration::from_millis(200)).await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    harness.wait_for(&job.id, JobStatus::Downloading).await;

    let requested = harness.scheduler.pause(&job.id).unwrap();
    assert_eq!(requested.status, JobStatus::Downloading);
    assert!(requested.pause_requested);

    let paused = harness.wait_for(&job.id, JobStatus::Paused).await;
    assert_eq!(paused.paused_from, Some(JobStatus::ReadyEncode));
    assert!(!paused.pause_requested);
    assert!(paused.local_original_path.is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.encoder.encode_count().await, 0);

    harness.transfer.set_delay(Duration::ZERO).await;
    harness.scheduler.resume(&job.id).unwrap();
    harness.wait_for(&job.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_resume_cancels_deferred_pause() {
    let harness = TestHarness::new();
    harness.transfer.set_delay(Duration::from_millis(200)).await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    harness.wait_for(&job.id, JobStatus::Downloading).await;

    harness.scheduler.pause(&job.id).unwrap();
    let resumed = harness.scheduler.resume(&job.id).unwrap();
    assert!(!resumed.pause_requested);

    harness.transfer.set_delay(Duration::ZERO).await;
    harness.wait_for(&job.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_delete_rules() {
    let harness = TestHarness::new();
    harness.transfer.set_delay(Duration::from_millis(200)).await;

    let waiting = harness.enqueue("movies/a.mkv").await;
    let deleted = harness.scheduler.delete(&waiting.id).await.unwrap();
    assert_eq!(deleted.id, waiting.id);
    assert!(harness.store.get(&waiting.id).unwrap().is_none());

    let job = harness.enqueue("movies/b.mkv").await;
    harness.start().await;
    harness.wait_for(&job.id, JobStatus::Downloading).await;
    assert!(harness.scheduler.delete(&job.id).await.is_err());

    harness.transfer.set_delay(Duration::ZERO).await;
    harness.wait_for(&job.id, JobStatus::Completed).await;
    harness.scheduler.delete(&job.id).await.unwrap();
    assert!(!harness.work_dir.path().join(&job.id).exists());

    let err = harness.scheduler.delete(&job.id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Store(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_duplicate_enqueue_rejected() {
    let harness = TestHarness::new();
    harness.enqueue("movies/Heat.mkv").await;

    let err = harness
        .scheduler
        .enqueue(EnqueueRequest::new("/movies/Heat.mkv"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Store(StoreError::Duplicate { .. })
    ));
}

#[tokio::test]
async fn test_interrupted_jobs_fail_on_start() {
    let harness = TestHarness::new();
    let job = harness.enqueue("movies/Heat.mkv").await;
    harness
        .store
        .transition(
            &job.id,
            JobStatus::Waiting,
            JobStatus::Downloading,
            JobPatch::new(),
        )
        .unwrap();

    harness.start().await;
    let failed = harness.job(&job.id);
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error.map(|e| e.kind),
        Some(ErrorKind::Interrupted)
    );

    harness.scheduler.retry(&job.id).unwrap();
    harness.wait_for(&job.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_job_view_carries_progress() {
    let harness = TestHarness::new();
    harness.transfer.set_delay(Duration::from_millis(300)).await;
    harness.start().await;

    let job = harness.enqueue("movies/Heat.mkv").await;
    harness.wait_for(&job.id, JobStatus::Downloading).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = harness.scheduler.job(&job.id).unwrap();
    assert!(matches!(view.progress, Some(JobProgress::Download(_))));

    harness.transfer.set_delay(Duration::ZERO).await;
    harness.wait_for(&job.id, JobStatus::Completed).await;
    assert!(harness.scheduler.job(&job.id).unwrap().progress.is_none());
}

#[tokio::test]
async fn test_stop_halts_admission() {
    let harness = TestHarness::new();
    harness.start().await;
    harness.scheduler.stop().await;
    assert!(!harness.scheduler.is_running());

    let job = harness.enqueue("movies/Heat.mkv").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.job(&job.id).status, JobStatus::Waiting);
}

#[tokio::test]
async fn test_store_rejects_out_of_order_transition() {
    let harness = TestHarness::new();
    let job = harness.enqueue("movies/Heat.mkv").await;

    let err = harness
        .store
        .transition(
            &job.id,
            JobStatus::Waiting,
            JobStatus::Uploading,
            JobPatch::new(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
    assert_eq!(harness.job(&job.id).status, JobStatus::Waiting);
}
