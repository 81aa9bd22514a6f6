//! Mock media probe for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::job::MediaFacts;
use crate::probe::{MediaProbe, ProbeError};

/// Mock implementation of the MediaProbe trait.
///
/// Returns [`fixtures::media_facts`](super::fixtures::media_facts) unless a
/// path has its own facts or is marked missing.
#[derive(Debug, Default)]
pub struct MockProbe {
    facts: Arc<RwLock<HashMap<String, MediaFacts>>>,
    missing: Arc<RwLock<HashSet<String>>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_facts(&self, remote_path: &str, facts: MediaFacts) {
        self.facts
            .write()
            .await
            .insert(remote_path.to_string(), facts);
    }

    /// Probing `remote_path` will fail with not found.
    pub async fn set_missing(&self, remote_path: &str) {
        self.missing.write().await.insert(remote_path.to_string());
    }
}

#[async_trait]
impl MediaProbe for MockProbe {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, remote_path: &str) -> Result<MediaFacts, ProbeError> {
        if self.missing.read().await.contains(remote_path) {
            return Err(ProbeError::NotFound {
                path: remote_path.to_string(),
            });
        }
        Ok(self
            .facts
            .read()
            .await
            .get(remote_path)
            .cloned()
            .unwrap_or_else(super::fixtures::media_facts))
    }
}
