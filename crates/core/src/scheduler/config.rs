//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Static tuning for the pipeline scheduler.
///
/// Concurrency limits are live settings, see
/// [`PipelineSettings`](crate::config::PipelineSettings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fallback interval between admission passes (milliseconds).
    /// Commands and finished workers wake the loop immediately.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Minimum time between progress events for one job (milliseconds).
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_progress_interval() -> u64 {
    500
}

fn default_event_buffer() -> usize {
    256
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            progress_interval_ms: default_progress_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}
