use serde::{Deserialize, Serialize};

/// Configuration for the drain-then-shutdown monitor.
///
/// Whether shutdown happens at all is the live
/// `shutdown_when_finished` setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Wait after the queue drains before shutting down.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// How often the queue is checked (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Program and arguments that power off the host.
    #[serde(default = "default_command")]
    pub command: Vec<String>,
}

fn default_grace_period() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_command() -> Vec<String> {
    ["shutdown", "-h", "now"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            poll_interval_ms: default_poll_interval(),
            command: default_command(),
        }
    }
}
