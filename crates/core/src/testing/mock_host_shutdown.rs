//! Mock host shutdown for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::shutdown::{HostShutdown, ShutdownError};

/// Counts shutdown requests instead of powering anything off.
#[derive(Debug, Default)]
pub struct MockHostShutdown {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl MockHostShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following shutdown report failure (it is still counted).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl HostShutdown for MockHostShutdown {
    fn name(&self) -> &str {
        "mock"
    }

    async fn shutdown(&self) -> Result<(), ShutdownError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ShutdownError::CommandFailed {
                status: "exit status: 1".to_string(),
                stderr: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}
