//! Watches the queue and shuts the host down once it drains.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::ShutdownConfig;
use super::host::HostShutdown;
use crate::config::SettingsProvider;
use crate::events::{EventBus, PipelineEvent};
use crate::job::{JobFilter, JobStore, StoreError};
use crate::metrics;

/// What one check observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Nothing has been queued since the last drain.
    Idle,
    /// Jobs are still active.
    Busy,
    /// The queue just drained; shutdown is not enabled.
    Drained,
    /// Work arrived (or shutdown was disabled) during the grace period.
    ShutdownCancelled,
    /// The host shutdown collaborator was invoked.
    ShutdownTriggered,
}

/// Arms when active work is seen and fires once when it is all gone.
///
/// Work is seen either by polling the store or through job events, so a
/// job that comes and goes between two polls still arms the monitor.
pub struct ShutdownMonitor {
    store: Arc<dyn JobStore>,
    settings: Arc<dyn SettingsProvider>,
    host: Arc<dyn HostShutdown>,
    config: ShutdownConfig,
    events: EventBus,
    events_rx: broadcast::Receiver<PipelineEvent>,
    armed: bool,
}

impl ShutdownMonitor {
    pub fn new(
        store: Arc<dyn JobStore>,
        settings: Arc<dyn SettingsProvider>,
        host: Arc<dyn HostShutdown>,
        config: ShutdownConfig,
        events: EventBus,
    ) -> Self {
        let events_rx = events.subscribe();
        Self {
            store,
            settings,
            host,
            config,
            events,
            events_rx,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn active_jobs(&self) -> Result<i64, StoreError> {
        self.store.count(&JobFilter::active())
    }

    /// Drain pending events. True when any of them shows a job moving.
    fn saw_job_activity(&mut self) -> bool {
        let mut seen = false;
        loop {
            match self.events_rx.try_recv() {
                Ok(PipelineEvent::JobEnqueued { .. } | PipelineEvent::JobStatusChanged { .. }) => {
                    seen = true
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!("Shutdown monitor skipped {} events", skipped);
                    seen = true;
                }
                Err(_) => return seen,
            }
        }
    }

    /// Look at the queue once. Waits out the grace period when the queue
    /// has just drained and shutdown is enabled.
    pub async fn check(&mut self) -> Result<MonitorState, StoreError> {
        if self.saw_job_activity() && !self.armed {
            debug!("Shutdown monitor armed by job events");
            self.armed = true;
        }
        let active = self.active_jobs()?;
        if active > 0 {
            if !self.armed {
                debug!("Shutdown monitor armed ({} active jobs)", active);
                self.armed = true;
            }
            return Ok(MonitorState::Busy);
        }
        if !self.armed {
            return Ok(MonitorState::Idle);
        }

        self.armed = false;
        info!("Queue drained");
        self.events.publish(PipelineEvent::QueueDrained);

        if !self.settings.snapshot().shutdown_when_finished {
            return Ok(MonitorState::Drained);
        }

        info!(
            "Shutting down host in {}s unless new work arrives",
            self.config.grace_period_secs
        );
        tokio::time::sleep(Duration::from_secs(self.config.grace_period_secs)).await;

        let arrived = self.saw_job_activity();
        if arrived || self.active_jobs()? > 0 {
            info!("New work arrived, host shutdown cancelled");
            self.armed = true;
            return Ok(MonitorState::ShutdownCancelled);
        }
        if !self.settings.snapshot().shutdown_when_finished {
            info!("Shutdown disabled during grace period");
            return Ok(MonitorState::ShutdownCancelled);
        }

        metrics::HOST_SHUTDOWNS.inc();
        info!("Invoking host shutdown ({})", self.host.name());
        if let Err(e) = self.host.shutdown().await {
            error!("Host shutdown failed: {}", e);
        }
        Ok(MonitorState::ShutdownTriggered)
    }

    /// Run checks until `shutdown_rx` fires.
    pub fn spawn(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        tokio::spawn(async move {
            info!("Shutdown monitor started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = self.check() => {
                        if let Err(e) = result {
                            warn!("Shutdown monitor check failed: {}", e);
                        }
                    }
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            info!("Shutdown monitor stopped");
        })
    }
}
