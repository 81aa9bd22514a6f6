//! Trait definitions for the encoder module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::EncoderError;
use super::types::{EncodeOutput, EncodeProgress, EncodeRequest};

/// Something that can re-encode a local media file.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Encode `request.input_path` into `request.output_dir`.
    ///
    /// Progress goes to `progress_tx` on a best-effort basis; a full or
    /// closed channel never fails the encode.
    async fn encode(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::Sender<EncodeProgress>,
    ) -> Result<EncodeOutput, EncoderError>;

    /// Validates that the encoder is properly configured and ready.
    async fn validate(&self) -> Result<(), EncoderError>;
}
