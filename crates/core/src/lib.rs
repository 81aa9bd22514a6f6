pub mod backup;
pub mod config;
pub mod encoder;
pub mod events;
pub mod job;
pub mod metrics;
pub mod probe;
pub mod progress;
pub mod scheduler;
pub mod shutdown;
pub mod testing;
pub mod transfer;

pub use backup::{BackupManager, RestoreError, RestoreOutcome, RestoreSource};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LiveSettings,
    PipelineSettings, SanitizedConfig, SettingsProvider,
};
pub use events::{EventBus, PipelineEvent};
pub use job::{
    ErrorKind, Job, JobError, JobFilter, JobStatus, JobStore, SqliteJobStore, StoreError,
};
pub use progress::JobProgress;
pub use scheduler::{
    EnqueueRequest, JobView, PipelineScheduler, QueueStatus, SchedulerConfig, SchedulerError,
};
pub use shutdown::{CommandShutdown, HostShutdown, ShutdownConfig, ShutdownMonitor};
