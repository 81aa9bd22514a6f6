//! Pipeline events.
//!
//! Events fan out over a broadcast channel; slow subscribers lag and miss
//! events rather than slowing the pipeline down.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::backup::{RestoreOutcome, RestoreSource};
use crate::job::{JobError, JobStatus};
use crate::progress::JobProgress;

/// Something observable happened in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    JobEnqueued {
        job_id: String,
        remote_path: String,
    },
    JobStatusChanged {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<JobError>,
    },
    JobProgress {
        job_id: String,
        progress: JobProgress,
    },
    JobDeleted {
        job_id: String,
    },
    JobRestored {
        job_id: String,
        source: RestoreSource,
        outcome: RestoreOutcome,
    },
    /// No active jobs remain.
    QueueDrained,
}

impl PipelineEvent {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            PipelineEvent::JobEnqueued { job_id, .. }
            | PipelineEvent::JobStatusChanged { job_id, .. }
            | PipelineEvent::JobProgress { job_id, .. }
            | PipelineEvent::JobDeleted { job_id }
            | PipelineEvent::JobRestored { job_id, .. } => Some(job_id),
            PipelineEvent::QueueDrained => None,
        }
    }
}

/// Broadcasts pipeline events to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers. Having none is fine.
    pub fn publish(&self, event: PipelineEvent) {
        if let Err(e) = self.sender.send(event) {
            trace!("No event subscribers: {:?}", e.0);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
