use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Storage paths are set
/// - Pipeline limits are at least 1
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.storage.remote_root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.remote_root cannot be empty".to_string(),
        ));
    }
    if config.storage.work_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.work_dir cannot be empty".to_string(),
        ));
    }

    if config.scheduler.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    config.pipeline.validate()
}
