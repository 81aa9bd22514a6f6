use std::sync::Arc;

use recast_core::{Config, LiveSettings, PipelineScheduler, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    scheduler: Arc<PipelineScheduler>,
    settings: Arc<LiveSettings>,
}

impl AppState {
    pub fn new(
        config: Config,
        scheduler: Arc<PipelineScheduler>,
        settings: Arc<LiveSettings>,
    ) -> Self {
        Self {
            config,
            scheduler,
            settings,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }

    /// Live settings, writable through the API.
    pub fn settings(&self) -> &LiveSettings {
        &self.settings
    }
}
