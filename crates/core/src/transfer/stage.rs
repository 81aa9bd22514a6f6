//! Retried, progress-reporting transfers for pipeline workers.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::retry::{run_with_retry, RetryFailure, RetryPolicy};
use super::traits::Transfer;
use super::types::TransferProgress;
use super::TransferError;
use crate::progress::{JobProgress, ProgressForwarder};

const PROGRESS_CHANNEL_SIZE: usize = 64;

/// Wraps a [`Transfer`] with retries and progress publishing.
#[derive(Clone)]
pub struct TransferStage {
    transfer: Arc<dyn Transfer>,
    forwarder: ProgressForwarder,
}

impl TransferStage {
    pub fn new(transfer: Arc<dyn Transfer>, forwarder: ProgressForwarder) -> Self {
        Self {
            transfer,
            forwarder,
        }
    }

    pub fn transfer(&self) -> &Arc<dyn Transfer> {
        &self.transfer
    }

    pub async fn download(
        &self,
        job_id: &str,
        remote_path: &str,
        local_path: &Path,
        policy: &RetryPolicy,
    ) -> Result<u64, RetryFailure> {
        let result = run_with_retry(policy, "download", |_| async move {
            let (tx, rx) = mpsc::channel::<TransferProgress>(PROGRESS_CHANNEL_SIZE);
            let forwarding = self.forwarder.spawn(job_id, rx, JobProgress::Download);
            let result = self.transfer.download(remote_path, local_path, tx).await;
            let _ = forwarding.await;
            result
        })
        .await;
        self.forwarder.board().clear(job_id);
        result
    }

    pub async fn upload(
        &self,
        job_id: &str,
        local_path: &Path,
        remote_path: &str,
        policy: &RetryPolicy,
    ) -> Result<u64, RetryFailure> {
        let result = run_with_retry(policy, "upload", |_| async move {
            let (tx, rx) = mpsc::channel::<TransferProgress>(PROGRESS_CHANNEL_SIZE);
            let forwarding = self.forwarder.spawn(job_id, rx, JobProgress::Upload);
            let result = self.transfer.upload(local_path, remote_path, tx).await;
            let _ = forwarding.await;
            result
        })
        .await;
        self.forwarder.board().clear(job_id);
        result
    }

    /// Run a small remote operation (rename, exists, remove) under the retry policy.
    pub async fn remote<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        label: &str,
        op: F,
    ) -> Result<T, RetryFailure>
    where
        F: Fn(Arc<dyn Transfer>) -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        run_with_retry(policy, label, |_| op(Arc::clone(&self.transfer))).await
    }
}
