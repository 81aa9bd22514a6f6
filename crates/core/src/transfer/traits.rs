//! Trait definitions for the transfer module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::TransferError;
use super::types::TransferProgress;

/// Moves files between the remote media server and local disk.
///
/// Remote paths are relative to the remote root and use `/` separators.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Returns the name of this transfer implementation.
    fn name(&self) -> &str;

    /// Copy `remote_path` to `local_path`. Returns bytes transferred.
    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress_tx: mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError>;

    /// Copy `local_path` to `remote_path`, replacing any existing file.
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress_tx: mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError>;

    /// Rename on the remote side, replacing `to` if it exists.
    async fn rename(&self, from: &str, to: &str) -> Result<(), TransferError>;

    async fn exists(&self, remote_path: &str) -> Result<bool, TransferError>;

    /// Size of a remote file in bytes, or `None` when there is no file.
    async fn size(&self, remote_path: &str) -> Result<Option<u64>, TransferError>;

    async fn remove(&self, remote_path: &str) -> Result<(), TransferError>;
}
