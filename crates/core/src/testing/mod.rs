//! Testing utilities and mock implementations of the collaborator traits.
//!
//! The mocks let the full pipeline run in tests without ffmpeg, a mounted
//! remote or a host to power off.
//!
//! # Example
//!
//! ```rust,ignore
//! use recast_core::testing::{MockEncoder, MockProbe, MockTransfer};
//!
//! let transfer = MockTransfer::new();
//! transfer.put_file("movies/a.mkv", b"original").await;
//!
//! let encoder = MockEncoder::new();
//! encoder.set_size_after(2_000_000_000).await; // trip the quality gate
//!
//! // Hand them to PipelineScheduler::new(...)
//! ```

mod mock_encoder;
mod mock_host_shutdown;
mod mock_probe;
mod mock_transfer;

pub use mock_encoder::MockEncoder;
pub use mock_host_shutdown::MockHostShutdown;
pub use mock_probe::MockProbe;
pub use mock_transfer::{MockFailure, MockTransfer};

use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks how many callers are inside a section and the highest count seen.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard { gauge: self }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Leaves the gauge when dropped.
#[derive(Debug)]
pub struct GaugeGuard<'a> {
    gauge: &'a ConcurrencyGauge,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::PipelineSettings;
    use crate::job::{CreateJobRequest, MediaFacts};
    use crate::scheduler::SchedulerConfig;

    /// A 1 GB h264 movie, the default answer of the mock probe.
    pub fn media_facts() -> MediaFacts {
        MediaFacts {
            size_before: 1_000_000_000,
            codec_before: Some("h264".to_string()),
            container: Some("matroska,webm".to_string()),
            resolution: Some("1920x1080".to_string()),
            bitrate_before: Some(8_000_000),
            duration_seconds: Some(1000.0),
            audio_track_count: 2,
            subtitle_track_count: 1,
        }
    }

    pub fn create_request(remote_path: &str) -> CreateJobRequest {
        CreateJobRequest {
            remote_path: remote_path.to_string(),
            media: media_facts(),
            pause_before_upload: false,
        }
    }

    /// Settings with retries that back off in milliseconds, not seconds.
    pub fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            retry_backoff_ms: 1,
            ..PipelineSettings::default()
        }
    }

    /// Scheduler config that polls and reports progress quickly.
    pub fn fast_scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            poll_interval_ms: 10,
            progress_interval_ms: 0,
            event_buffer: 1024,
        }
    }
}
