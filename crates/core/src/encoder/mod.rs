//! Encoder module for re-encoding downloaded media files.
//!
//! This module provides the `Encoder` trait and an FFmpeg implementation.
//! The scheduler guarantees at most one encode runs at a time; encoders
//! themselves do not enforce it.
//!
//! # Example
//!
//! ```ignore
//! use recast_core::encoder::{EncodeRequest, Encoder, EncodingParams, FfmpegEncoder};
//!
//! let encoder = FfmpegEncoder::with_defaults();
//! encoder.validate().await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(16);
//! let output = encoder
//!     .encode(
//!         EncodeRequest {
//!             job_id: "job-1".to_string(),
//!             input_path: PathBuf::from("/work/job-1/movie.avi"),
//!             output_dir: PathBuf::from("/work/job-1"),
//!             params: EncodingParams::default(),
//!             duration_seconds: Some(5400.0),
//!         },
//!         tx,
//!     )
//!     .await?;
//! println!("{} bytes, {}", output.size_after, output.codec_after);
//! ```

mod config;
mod error;
mod ffmpeg;
mod gate;
mod traits;
mod types;

pub use config::EncoderConfig;
pub use error::EncoderError;
pub use ffmpeg::FfmpegEncoder;
pub use gate::quality_gate;
pub use traits::Encoder;
pub use types::{EncodeOutput, EncodeProgress, EncodeRequest, EncodingParams};
