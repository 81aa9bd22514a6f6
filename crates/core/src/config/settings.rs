//! Pipeline settings that can change while the service runs.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;

use super::ConfigError;
use crate::encoder::EncodingParams;
use crate::transfer::RetryPolicy;

/// Operator-tunable pipeline behavior.
///
/// Workers read a fresh snapshot at the start of each stage, so a change
/// applies to the next admission, never to work already running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    #[serde(default = "default_max_downloads")]
    pub max_concurrent_downloads: usize,

    #[serde(default = "default_max_uploads")]
    pub max_concurrent_uploads: usize,

    /// Cap on jobs holding a local original (downloading, ready to encode, encoding).
    #[serde(default = "default_max_prefetch")]
    pub max_prefetch_files: usize,

    /// Retries after the first attempt for each transfer operation.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Keep the original on the server as `<stem>.backup.<ext>`.
    #[serde(default = "default_true")]
    pub create_backups: bool,

    /// Keep the downloaded original locally after upload.
    #[serde(default)]
    pub keep_original: bool,

    /// Keep the encoded file locally after upload.
    #[serde(default)]
    pub keep_encoded: bool,

    /// Fail encodes whose output is larger than the original.
    #[serde(default = "default_true")]
    pub block_larger_encoded: bool,

    /// Power off the host once the queue drains.
    #[serde(default)]
    pub shutdown_when_finished: bool,

    /// Default approval gate for newly enqueued jobs.
    #[serde(default)]
    pub pause_before_upload: bool,

    #[serde(default)]
    pub encoding: EncodingParams,
}

fn default_max_downloads() -> usize {
    2
}

fn default_max_uploads() -> usize {
    1
}

fn default_max_prefetch() -> usize {
    3
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_downloads(),
            max_concurrent_uploads: default_max_uploads(),
            max_prefetch_files: default_max_prefetch(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            create_backups: true,
            keep_original: false,
            keep_encoded: false,
            block_larger_encoded: true,
            shutdown_when_finished: false,
            pause_before_upload: false,
            encoding: EncodingParams::default(),
        }
    }
}

impl PipelineSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_concurrent_downloads", self.max_concurrent_downloads),
            ("max_concurrent_uploads", self.max_concurrent_uploads),
            ("max_prefetch_files", self.max_prefetch_files),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline.{} must be at least 1",
                    name
                )));
            }
        }

        if self.encoding.container.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.encoding.container cannot be empty".to_string(),
            ));
        }
        if self.encoding.video_encoder.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.encoding.video_encoder cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Source of the current pipeline settings.
pub trait SettingsProvider: Send + Sync {
    fn snapshot(&self) -> PipelineSettings;
}

/// In-process settings that the HTTP API can replace at runtime.
pub struct LiveSettings {
    inner: RwLock<PipelineSettings>,
}

impl LiveSettings {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// Validate and swap in new settings.
    pub fn replace(&self, settings: PipelineSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        let mut guard = self
            .inner
            .write()
            .map_err(|_| ConfigError::ValidationError("settings lock poisoned".to_string()))?;
        *guard = settings;
        Ok(())
    }

    /// Apply an in-place edit, keeping the old value if the result is invalid.
    pub fn update(&self, edit: impl FnOnce(&mut PipelineSettings)) -> Result<(), ConfigError> {
        let mut next = self.snapshot();
        edit(&mut next);
        self.replace(next)
    }
}

impl SettingsProvider for LiveSettings {
    fn snapshot(&self) -> PipelineSettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert!(settings.create_backups);
        assert!(settings.block_larger_encoded);
        assert!(!settings.shutdown_when_finished);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let settings = PipelineSettings {
            max_prefetch_files: 0,
            ..PipelineSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let settings = PipelineSettings {
            retry_attempts: 2,
            retry_backoff_ms: 10,
            ..PipelineSettings::default()
        };
        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_live_settings_replace_and_update() {
        let live = LiveSettings::new(PipelineSettings::default());
        live.update(|s| s.max_concurrent_downloads = 5).unwrap();
        assert_eq!(live.snapshot().max_concurrent_downloads, 5);

        let bad = live.update(|s| s.max_concurrent_uploads = 0);
        assert!(bad.is_err());
        assert_eq!(live.snapshot().max_concurrent_uploads, 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let live = LiveSettings::new(PipelineSettings::default());
        let before = live.snapshot();
        live.update(|s| s.encoding.crf = Some(30)).unwrap();
        assert_eq!(before.encoding.crf, Some(24));
        assert_eq!(live.snapshot().encoding.crf, Some(30));
    }
}
