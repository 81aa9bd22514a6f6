//! Pipeline scheduler.
//!
//! The scheduler owns the job lifecycle after enqueue:
//! - **Download**: concurrent, bounded by the download limit and by how many
//!   jobs may hold a local original at once (prefetch)
//! - **Encode**: exactly one job at a time
//! - **Approval**: optional operator gate before upload
//! - **Upload**: concurrent, bounded by the upload limit; ends with the
//!   backup and retention steps
//!
//! Within a stage jobs are admitted in the order they became eligible.
//! Queue state is never cached; [`PipelineScheduler::status`] derives it
//! from the store and the admission counters on every call.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = PipelineScheduler::new(
//!     store, transfer, encoder, probe, settings,
//!     SchedulerConfig::default(), work_dir,
//! );
//! scheduler.start().await?;
//!
//! let job = scheduler.enqueue(EnqueueRequest::new("movies/Heat.mkv")).await?;
//! let mut events = scheduler.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod admission;
mod commands;
mod config;
mod runner;
mod types;
mod workers;

pub use admission::{AdmissionCounters, AdmissionSnapshot, StagePermit, MAX_CONCURRENT_ENCODES};
pub use config::SchedulerConfig;
pub use runner::PipelineScheduler;
pub use types::{EnqueueRequest, JobView, PoolStatus, QueueStatus, SchedulerError};
