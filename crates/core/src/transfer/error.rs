//! Error types for the transfer module.

use std::io;
use thiserror::Error;

/// Errors that can occur while moving files to or from the remote server.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Remote path not found: {path}")]
    NotFound { path: String },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Path escapes the remote root: {path}")]
    InvalidPath { path: String },

    #[error("Transfer timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    /// Map an I/O error on `path` to the most specific variant.
    pub fn from_io(error: io::Error, path: impl Into<String>) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path: path.into() },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path: path.into() },
            _ => Self::Io(error),
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::WouldBlock
            ),
            Self::NotFound { .. } | Self::PermissionDenied { .. } | Self::InvalidPath { .. } => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(TransferError::Connection("reset".into()).is_transient());
        assert!(TransferError::Timeout { timeout_secs: 5 }.is_transient());
        assert!(TransferError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_transient());
        assert!(!TransferError::NotFound { path: "a".into() }.is_transient());
        assert!(!TransferError::Io(io::Error::from(io::ErrorKind::InvalidData)).is_transient());
    }

    #[test]
    fn test_from_io_maps_not_found() {
        let err = TransferError::from_io(io::Error::from(io::ErrorKind::NotFound), "x.mkv");
        assert!(matches!(err, TransferError::NotFound { ref path } if path == "x.mkv"));
    }
}
