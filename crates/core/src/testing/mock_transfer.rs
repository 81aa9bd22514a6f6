//! Mock transfer backend for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use super::ConcurrencyGauge;
use crate::transfer::{Transfer, TransferError, TransferProgress};

/// Kind of error an injected failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection-class error; retried by the transfer stage.
    Transient,
    /// Permission error; never retried.
    Permanent,
}

impl MockFailure {
    fn to_error(self, path: &str) -> TransferError {
        match self {
            MockFailure::Transient => TransferError::Connection(format!("mock reset on {}", path)),
            MockFailure::Permanent => TransferError::PermissionDenied {
                path: path.to_string(),
            },
        }
    }
}

/// Mock implementation of the Transfer trait.
///
/// The "remote server" is an in-memory map of path to bytes. Provides:
/// - Seeding and inspecting remote files
/// - Injecting transient or permanent failures per operation
/// - Simulated transfer time
/// - Peak concurrency tracking for downloads and uploads
///
/// # Example
///
/// ```rust,ignore
/// use recast_core::testing::{MockFailure, MockTransfer};
///
/// let transfer = MockTransfer::new();
/// transfer.put_file("movies/a.mkv", b"original").await;
/// transfer.fail_downloads(2, MockFailure::Transient).await;
///
/// // ... run the pipeline ...
///
/// assert_eq!(transfer.download_calls(), 3);
/// ```
#[derive(Debug, Default)]
pub struct MockTransfer {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    download_failures: Arc<RwLock<Vec<MockFailure>>>,
    upload_failures: Arc<RwLock<Vec<MockFailure>>>,
    /// Renames whose source is one of these paths fail permanently.
    failing_rename_sources: Arc<RwLock<Vec<String>>>,
    delay_ms: Arc<RwLock<u64>>,
    download_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    downloads: ConcurrencyGauge,
    uploads: ConcurrencyGauge,
}

impl MockTransfer {
    /// Create a new mock transfer with an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file on the mock remote.
    pub async fn put_file(&self, path: &str, contents: &[u8]) {
        self.files
            .write()
            .await
            .insert(path.to_string(), contents.to_vec());
    }

    /// Contents of a remote file, if present.
    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(path).cloned()
    }

    pub async fn has_file(&self, path: &str) -> bool {
        self.files.read().await.contains_key(path)
    }

    /// All remote paths, sorted.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Fail the next `count` download attempts.
    pub async fn fail_downloads(&self, count: usize, failure: MockFailure) {
        self.download_failures
            .write()
            .await
            .extend(std::iter::repeat(failure).take(count));
    }

    /// Fail the next `count` upload attempts.
    pub async fn fail_uploads(&self, count: usize, failure: MockFailure) {
        self.upload_failures
            .write()
            .await
            .extend(std::iter::repeat(failure).take(count));
    }

    /// Make every rename away from `path` fail with permission denied.
    pub async fn fail_renames_from(&self, path: &str) {
        self.failing_rename_sources
            .write()
            .await
            .push(path.to_string());
    }

    pub async fn clear_failures(&self) {
        self.download_failures.write().await.clear();
        self.upload_failures.write().await.clear();
        self.failing_rename_sources.write().await.clear();
    }

    /// Simulated duration of each download and upload.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Highest number of downloads seen running at once.
    pub fn peak_downloads(&self) -> usize {
        self.downloads.peak()
    }

    /// Highest number of uploads seen running at once.
    pub fn peak_uploads(&self) -> usize {
        self.uploads.peak()
    }

    async fn take_failure(queue: &RwLock<Vec<MockFailure>>) -> Option<MockFailure> {
        let mut queue = queue.write().await;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }

    async fn simulate(&self, total: u64, progress_tx: &mpsc::Sender<TransferProgress>) {
        let delay = Duration::from_millis(*self.delay_ms.read().await);
        let half = total / 2;
        let _ = progress_tx.try_send(TransferProgress::from_stats(half, total, delay / 2));
        tokio::time::sleep(delay).await;
        let _ = progress_tx.try_send(TransferProgress::from_stats(total, total, delay));
    }
}

#[async_trait]
impl Transfer for MockTransfer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress_tx: mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let _running = self.downloads.enter();

        let contents = self
            .file(remote_path)
            .await
            .ok_or_else(|| TransferError::NotFound {
                path: remote_path.to_string(),
            })?;
        self.simulate(contents.len() as u64, &progress_tx).await;

        if let Some(failure) = Self::take_failure(&self.download_failures).await {
            return Err(failure.to_error(remote_path));
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &contents).await?;
        Ok(contents.len() as u64)
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress_tx: mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let _running = self.uploads.enter();

        let contents = tokio::fs::read(local_path).await?;
        self.simulate(contents.len() as u64, &progress_tx).await;

        if let Some(failure) = Self::take_failure(&self.upload_failures).await {
            return Err(failure.to_error(remote_path));
        }

        let size = contents.len() as u64;
        self.files
            .write()
            .await
            .insert(remote_path.to_string(), contents);
        Ok(size)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransferError> {
        if self
            .failing_rename_sources
            .read()
            .await
            .iter()
            .any(|p| p == from)
        {
            return Err(MockFailure::Permanent.to_error(from));
        }

        let mut files = self.files.write().await;
        let contents = files.remove(from).ok_or_else(|| TransferError::NotFound {
            path: from.to_string(),
        })?;
        files.insert(to.to_string(), contents);
        Ok(())
    }

    async fn exists(&self, remote_path: &str) -> Result<bool, TransferError> {
        Ok(self.has_file(remote_path).await)
    }

    async fn size(&self, remote_path: &str) -> Result<Option<u64>, TransferError> {
        Ok(self
            .files
            .read()
            .await
            .get(remote_path)
            .map(|contents| contents.len() as u64))
    }

    async fn remove(&self, remote_path: &str) -> Result<(), TransferError> {
        self.files.write().await.remove(remote_path);
        Ok(())
    }
}
