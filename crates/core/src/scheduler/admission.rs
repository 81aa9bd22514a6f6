//! Admission counters for the download, encode and upload stages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The encoder is exclusive: one encode at a time, whatever the settings say.
pub const MAX_CONCURRENT_ENCODES: usize = 1;

/// A held slot in a transfer pool. Dropping it frees the slot.
#[derive(Debug)]
pub struct StagePermit {
    counter: Arc<AtomicUsize>,
}

impl Drop for StagePermit {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Occupancy of the three stages at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionSnapshot {
    pub active_downloads: usize,
    pub active_encodes: usize,
    pub active_uploads: usize,
}

/// Bounded counts of jobs occupying each stage.
///
/// Transfer limits are passed in on every admission so live setting
/// changes apply to the next job. Lowering a limit never preempts
/// running work; the pool drains down to the new limit.
pub struct AdmissionCounters {
    downloads: Arc<AtomicUsize>,
    uploads: Arc<AtomicUsize>,
    encode: Arc<Semaphore>,
}

impl Default for AdmissionCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionCounters {
    pub fn new() -> Self {
        Self {
            downloads: Arc::new(AtomicUsize::new(0)),
            uploads: Arc::new(AtomicUsize::new(0)),
            encode: Arc::new(Semaphore::new(MAX_CONCURRENT_ENCODES)),
        }
    }

    pub fn try_admit_download(&self, limit: usize) -> Option<StagePermit> {
        Self::try_admit(&self.downloads, limit)
    }

    pub fn try_admit_upload(&self, limit: usize) -> Option<StagePermit> {
        Self::try_admit(&self.uploads, limit)
    }

    pub fn try_admit_encode(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.encode).try_acquire_owned().ok()
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            active_downloads: self.downloads.load(Ordering::Acquire),
            active_encodes: MAX_CONCURRENT_ENCODES - self.encode.available_permits(),
            active_uploads: self.uploads.load(Ordering::Acquire),
        }
    }

    fn try_admit(counter: &Arc<AtomicUsize>, limit: usize) -> Option<StagePermit> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| StagePermit {
                counter: Arc::clone(counter),
            })
    }
}
