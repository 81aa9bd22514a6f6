//! Transfer against a remote server mounted into the local filesystem
//! (NFS, SMB, sshfs and the like).

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::config::TransferConfig;
use super::error::TransferError;
use super::traits::Transfer;
use super::types::TransferProgress;

/// Join a remote path onto `root`, refusing anything that climbs out of it.
pub fn resolve_remote(root: &Path, remote_path: &str) -> Option<PathBuf> {
    let relative = Path::new(remote_path.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(resolved)
}

/// File system based transfer implementation.
pub struct FsTransfer {
    remote_root: PathBuf,
    config: TransferConfig,
}

impl FsTransfer {
    pub fn new(remote_root: impl Into<PathBuf>, config: TransferConfig) -> Self {
        Self {
            remote_root: remote_root.into(),
            config,
        }
    }

    pub fn with_defaults(remote_root: impl Into<PathBuf>) -> Self {
        Self::new(remote_root, TransferConfig::default())
    }

    fn resolve(&self, remote_path: &str) -> Result<PathBuf, TransferError> {
        resolve_remote(&self.remote_root, remote_path).ok_or_else(|| TransferError::InvalidPath {
            path: remote_path.to_string(),
        })
    }

    async fn ensure_parent(path: &Path) -> Result<(), TransferError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::from_io(e, parent.display().to_string()))?;
        }
        Ok(())
    }

    /// Chunked copy that reports progress after every chunk.
    async fn copy_with_progress(
        &self,
        source: &Path,
        destination: &Path,
        progress_tx: &mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        let source_file = File::open(source)
            .await
            .map_err(|e| TransferError::from_io(e, source.display().to_string()))?;
        let bytes_total = source_file.metadata().await?.len();

        Self::ensure_parent(destination).await?;
        let dest_file = File::create(destination)
            .await
            .map_err(|e| TransferError::from_io(e, destination.display().to_string()))?;

        let mut reader = BufReader::with_capacity(self.config.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.config.buffer_size, dest_file);
        let stall = Duration::from_secs(self.config.stall_timeout_secs);
        let stalled = || TransferError::Timeout {
            timeout_secs: self.config.stall_timeout_secs,
        };

        let start = Instant::now();
        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; self.config.buffer_size];

        loop {
            let bytes_read = timeout(stall, reader.read(&mut buffer))
                .await
                .map_err(|_| stalled())??;
            if bytes_read == 0 {
                break;
            }

            timeout(stall, writer.write_all(&buffer[..bytes_read]))
                .await
                .map_err(|_| stalled())??;
            total_bytes += bytes_read as u64;

            // Non-blocking send
            let _ = progress_tx.try_send(TransferProgress::from_stats(
                total_bytes,
                bytes_total,
                start.elapsed(),
            ));
        }

        timeout(stall, writer.flush())
            .await
            .map_err(|_| stalled())??;

        Ok(total_bytes)
    }

    async fn copy_or_clean(
        &self,
        source: &Path,
        destination: &Path,
        progress_tx: &mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        let result = self.copy_with_progress(source, destination, progress_tx).await;
        if result.is_err() {
            let _ = fs::remove_file(destination).await;
        }
        result
    }
}

#[async_trait]
impl Transfer for FsTransfer {
    fn name(&self) -> &str {
        "fs"
    }

    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress_tx: mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        let source = self.resolve(remote_path)?;
        if !fs::try_exists(&source).await? {
            return Err(TransferError::NotFound {
                path: remote_path.to_string(),
            });
        }
        self.copy_or_clean(&source, local_path, &progress_tx).await
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress_tx: mpsc::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        let destination = self.resolve(remote_path)?;
        self.copy_or_clean(local_path, &destination, &progress_tx)
            .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransferError> {
        let source = self.resolve(from)?;
        let destination = self.resolve(to)?;
        Self::ensure_parent(&destination).await?;
        fs::rename(&source, &destination)
            .await
            .map_err(|e| TransferError::from_io(e, from))
    }

    async fn exists(&self, remote_path: &str) -> Result<bool, TransferError> {
        let path = self.resolve(remote_path)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn size(&self, remote_path: &str) -> Result<Option<u64>, TransferError> {
        let path = self.resolve(remote_path)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransferError::from_io(e, remote_path)),
        }
    }

    /// Removing a path that is already gone succeeds.
    async fn remove(&self, remote_path: &str) -> Result<(), TransferError> {
        let path = self.resolve(remote_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransferError::from_io(e, remote_path)),
        }
    }
}
