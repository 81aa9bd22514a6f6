use async_trait::async_trait;

use super::ProbeError;
use crate::job::MediaFacts;

/// Reads media facts for a file on the remote server.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Probe the file at `remote_path` (relative to the remote root).
    async fn probe(&self, remote_path: &str) -> Result<MediaFacts, ProbeError>;
}
