//! Configuration for the transfer module.

use serde::{Deserialize, Serialize};

/// Configuration for the filesystem transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Buffer size for file copies in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Give up on a copy when a single read or write stalls this long.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

fn default_buffer_size() -> usize {
    8 * 1024 * 1024 // 8 MB
}

fn default_stall_timeout() -> u64 {
    60
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}
