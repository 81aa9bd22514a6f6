use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress of a single download or upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub rate_bytes_per_sec: f64,
    pub eta_seconds: Option<f64>,
}

impl TransferProgress {
    /// Derive rate and ETA from bytes moved over `elapsed`.
    pub fn from_stats(bytes_transferred: u64, bytes_total: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            bytes_transferred as f64 / secs
        } else {
            0.0
        };
        let remaining = bytes_total.saturating_sub(bytes_transferred);
        let eta_seconds = if rate > 0.0 {
            Some(remaining as f64 / rate)
        } else {
            None
        };

        Self {
            bytes_transferred,
            bytes_total,
            rate_bytes_per_sec: rate,
            eta_seconds,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            (self.bytes_transferred as f64 / self.bytes_total as f64 * 100.0).min(100.0)
        }
    }
}
