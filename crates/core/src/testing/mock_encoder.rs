//! Mock encoder for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use super::ConcurrencyGauge;
use crate::encoder::{EncodeOutput, EncodeProgress, EncodeRequest, Encoder, EncoderError};

/// Mock implementation of the Encoder trait.
///
/// Provides controllable behavior for testing:
/// - Records every request (including the params it was given)
/// - Writes `encoded-<n>` into the real output path
/// - Reported output size is configurable
/// - Simulated failures and encode time
/// - Peak concurrency tracking
///
/// # Example
///
/// ```rust,ignore
/// use recast_core::testing::MockEncoder;
///
/// let encoder = MockEncoder::new();
/// encoder.set_size_after(1_200_000_000).await;
///
/// // ... run the pipeline ...
///
/// assert_eq!(encoder.encode_count().await, 1);
/// assert_eq!(encoder.peak_concurrency(), 1);
/// ```
#[derive(Debug)]
pub struct MockEncoder {
    requests: Arc<RwLock<Vec<EncodeRequest>>>,
    size_after: Arc<RwLock<u64>>,
    failures: Arc<RwLock<usize>>,
    delay_ms: Arc<RwLock<u64>>,
    counter: AtomicUsize,
    running: ConcurrencyGauge,
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEncoder {
    /// Default reported output size: half of the default probed size.
    pub const DEFAULT_SIZE_AFTER: u64 = 500_000_000;

    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            size_after: Arc::new(RwLock::new(Self::DEFAULT_SIZE_AFTER)),
            failures: Arc::new(RwLock::new(0)),
            delay_ms: Arc::new(RwLock::new(10)),
            counter: AtomicUsize::new(0),
            running: ConcurrencyGauge::default(),
        }
    }

    /// Requests received so far, in order.
    pub async fn requests(&self) -> Vec<EncodeRequest> {
        self.requests.read().await.clone()
    }

    pub async fn encode_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Size reported for every following encode.
    pub async fn set_size_after(&self, size: u64) {
        *self.size_after.write().await = size;
    }

    /// Fail the next `count` encodes.
    pub async fn fail_next(&self, count: usize) {
        *self.failures.write().await = count;
    }

    /// Simulated duration of each encode.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Highest number of encodes seen running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.running.peak()
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn encode(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::Sender<EncodeProgress>,
    ) -> Result<EncodeOutput, EncoderError> {
        let _running = self.running.enter();
        self.requests.write().await.push(request.clone());

        if !request.input_path.exists() {
            return Err(EncoderError::InputNotFound {
                path: request.input_path.clone(),
            });
        }

        let delay = Duration::from_millis(*self.delay_ms.read().await);
        let _ = progress_tx.try_send(EncodeProgress {
            percent: 50.0,
            fps: Some(24.0),
            speed: Some(1.0),
            eta_seconds: Some(delay.as_secs_f64() / 2.0),
        });
        tokio::time::sleep(delay).await;

        {
            let mut failures = self.failures.write().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(EncoderError::encode_failed(
                    "mock encoder failure",
                    Some("Conversion failed!".to_string()),
                ));
            }
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let output_path = request
            .params
            .output_path(&request.input_path, &request.output_dir);
        tokio::fs::write(&output_path, format!("encoded-{}", n)).await?;

        let _ = progress_tx.try_send(EncodeProgress {
            percent: 100.0,
            fps: Some(24.0),
            speed: Some(1.0),
            eta_seconds: Some(0.0),
        });

        Ok(EncodeOutput {
            output_path,
            codec_after: "hevc".to_string(),
            size_after: *self.size_after.read().await,
            bitrate_after: Some(2_000_000),
        })
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        Ok(())
    }
}
