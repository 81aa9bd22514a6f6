//! Types for the encoder module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Codec and container choices for an encode.
///
/// A copy of these is frozen onto the job when its encode starts, so later
/// settings changes never alter what a finished job reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingParams {
    /// FFmpeg video encoder (e.g. "libx265", "libsvtav1").
    #[serde(default = "default_video_encoder")]
    pub video_encoder: String,

    /// Constant rate factor, if the encoder takes one.
    #[serde(default = "default_crf")]
    pub crf: Option<u8>,

    #[serde(default = "default_preset")]
    pub preset: Option<String>,

    /// FFmpeg audio encoder, or "copy" to pass audio through.
    #[serde(default = "default_copy")]
    pub audio_encoder: String,

    /// FFmpeg subtitle encoder, or "copy".
    #[serde(default = "default_copy")]
    pub subtitle_encoder: String,

    /// Output container extension (e.g. "mkv").
    #[serde(default = "default_container")]
    pub container: String,

    /// Extra output arguments inserted before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_encoder() -> String {
    "libx265".to_string()
}

fn default_crf() -> Option<u8> {
    Some(24)
}

fn default_preset() -> Option<String> {
    Some("medium".to_string())
}

fn default_copy() -> String {
    "copy".to_string()
}

fn default_container() -> String {
    "mkv".to_string()
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self {
            video_encoder: default_video_encoder(),
            crf: default_crf(),
            preset: default_preset(),
            audio_encoder: default_copy(),
            subtitle_encoder: default_copy(),
            container: default_container(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingParams {
    /// Local output path for an input encoded with these params.
    pub fn output_path(&self, input_path: &Path, output_dir: &Path) -> PathBuf {
        let stem = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        output_dir.join(format!("{}.encoded.{}", stem, self.container))
    }
}

/// One encode to run.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub job_id: String,
    pub input_path: PathBuf,
    /// Directory to write the output into.
    pub output_dir: PathBuf,
    pub params: EncodingParams,
    /// Source duration, used for percent and ETA.
    pub duration_seconds: Option<f64>,
}

/// What the encoder produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOutput {
    pub output_path: PathBuf,
    pub codec_after: String,
    pub size_after: u64,
    pub bitrate_after: Option<u64>,
}

/// Progress update during an encode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EncodeProgress {
    /// 0.0 - 100.0
    pub percent: f32,
    pub fps: Option<f32>,
    /// Encode speed relative to realtime (e.g. 1.5).
    pub speed: Option<f32>,
    pub eta_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_container() {
        let params = EncodingParams::default();
        let path = params.output_path(Path::new("/work/j1/Movie.2019.avi"), Path::new("/work/j1"));
        assert_eq!(path, PathBuf::from("/work/j1/Movie.2019.encoded.mkv"));
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: EncodingParams = serde_json::from_str(r#"{"crf": 28}"#).unwrap();
        assert_eq!(params.crf, Some(28));
        assert_eq!(params.video_encoder, "libx265");
        assert_eq!(params.container, "mkv");
    }
}
