//! Live progress for in-flight jobs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::encoder::EncodeProgress;
use crate::events::{EventBus, PipelineEvent};
use crate::transfer::TransferProgress;

/// Live progress of the stage a job is in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum JobProgress {
    Download(TransferProgress),
    Encode(EncodeProgress),
    Upload(TransferProgress),
}

impl JobProgress {
    /// The last report of a stage; never throttled away.
    pub fn is_final(&self) -> bool {
        match self {
            JobProgress::Download(p) | JobProgress::Upload(p) => {
                p.bytes_total > 0 && p.bytes_transferred >= p.bytes_total
            }
            JobProgress::Encode(p) => p.percent >= 100.0,
        }
    }
}

/// Rate limiter for progress reports.
///
/// The first report and any final report always pass.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn should_emit(&mut self, is_final: bool) -> bool {
        let now = Instant::now();
        let due = match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due || is_final {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}

/// Latest progress per in-flight job. Never persisted.
#[derive(Clone, Default)]
pub struct ProgressBoard {
    inner: Arc<RwLock<HashMap<String, JobProgress>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, job_id: &str, progress: JobProgress) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(job_id.to_string(), progress);
        }
    }

    pub fn get(&self, job_id: &str) -> Option<JobProgress> {
        self.inner.read().ok()?.get(job_id).cloned()
    }

    pub fn clear(&self, job_id: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(job_id);
        }
    }
}

/// Publishes a job's raw progress stream, throttled, to the board and the bus.
///
/// The task ends when every sender for `rx` is dropped.
#[derive(Clone)]
pub struct ProgressForwarder {
    events: EventBus,
    board: ProgressBoard,
    interval: Duration,
}

impl ProgressForwarder {
    pub fn new(events: EventBus, board: ProgressBoard, interval: Duration) -> Self {
        Self {
            events,
            board,
            interval,
        }
    }

    pub fn board(&self) -> &ProgressBoard {
        &self.board
    }

    pub fn spawn<P, F>(&self, job_id: &str, mut rx: mpsc::Receiver<P>, wrap: F) -> JoinHandle<()>
    where
        P: Send + 'static,
        F: Fn(P) -> JobProgress + Send + 'static,
    {
        let events = self.events.clone();
        let board = self.board.clone();
        let job_id = job_id.to_string();
        let mut throttle = ProgressThrottle::new(self.interval);

        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                let progress = wrap(raw);
                if !throttle.should_emit(progress.is_final()) {
                    continue;
                }
                board.set(&job_id, progress.clone());
                events.publish(PipelineEvent::JobProgress {
                    job_id: job_id.clone(),
                    progress,
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_final_always_emit() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(3600));
        assert!(throttle.should_emit(false));
        assert!(!throttle.should_emit(false));
        assert!(throttle.should_emit(true));
    }

    #[test]
    fn test_zero_interval_emits_everything() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.should_emit(false));
        assert!(throttle.should_emit(false));
    }

    #[test]
    fn test_progress_board() {
        let board = ProgressBoard::new();
        board.set("j1", JobProgress::Download(TransferProgress::default()));
        assert!(board.get("j1").is_some());
        board.clear("j1");
        assert!(board.get("j1").is_none());
    }

    #[tokio::test]
    async fn test_forwarder_throttles_but_keeps_final() {
        let bus = EventBus::new(64);
        let mut events = bus.subscribe();
        let forwarder =
            ProgressForwarder::new(bus, ProgressBoard::new(), Duration::from_secs(3600));

        let (tx, rx) = mpsc::channel(16);
        let handle = forwarder.spawn("j1", rx, JobProgress::Download);
        for done in [10u64, 20, 30, 100] {
            tx.send(TransferProgress {
                bytes_transferred: done,
                bytes_total: 100,
                ..TransferProgress::default()
            })
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let mut seen = Vec::new();
        while let Ok(PipelineEvent::JobProgress {
            progress: JobProgress::Download(p),
            ..
        }) = events.try_recv()
        {
            seen.push(p.bytes_transferred);
        }
        assert_eq!(seen, vec![10, 100]);

        let last = forwarder.board().get("j1").unwrap();
        assert!(last.is_final());
    }
}
