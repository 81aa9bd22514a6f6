//! FFmpeg-based encoder implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::config::EncoderConfig;
use super::error::EncoderError;
use super::traits::Encoder;
use super::types::{EncodeOutput, EncodeProgress, EncodeRequest, EncodingParams};
use crate::probe::FfprobeProbe;

/// Lines of non-progress stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// FFmpeg-based encoder implementation.
pub struct FfmpegEncoder {
    config: EncoderConfig,
    probe: FfprobeProbe,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        let probe = FfprobeProbe::new(config.ffprobe_path.clone(), PathBuf::new());
        Self { config, probe }
    }

    /// Creates an encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    /// Builds ffmpeg arguments for one encode.
    fn build_args(&self, input_path: &Path, output_path: &Path, params: &EncodingParams) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-c:v".to_string(),
            params.video_encoder.clone(),
        ];

        if let Some(crf) = params.crf {
            args.extend(["-crf".to_string(), crf.to_string()]);
        }
        if let Some(ref preset) = params.preset {
            args.extend(["-preset".to_string(), preset.clone()]);
        }

        args.extend([
            "-c:a".to_string(),
            params.audio_encoder.clone(),
            "-c:s".to_string(),
            params.subtitle_encoder.clone(),
        ]);

        args.extend(params.extra_args.iter().cloned());

        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.push(output_path.to_string_lossy().to_string());
        args
    }

    async fn describe_output(
        &self,
        output_path: &Path,
        params: &EncodingParams,
        duration_seconds: Option<f64>,
    ) -> Result<EncodeOutput, EncoderError> {
        let size_after = tokio::fs::metadata(output_path)
            .await
            .map_err(|_| EncoderError::OutputMissing {
                path: output_path.to_path_buf(),
            })?
            .len();

        let facts = match self.probe.probe_file(output_path).await {
            Ok(facts) => Some(facts),
            Err(e) => {
                warn!(path = %output_path.display(), error = %e, "Could not probe encoded output");
                None
            }
        };

        let codec_after = facts
            .as_ref()
            .and_then(|f| f.codec_before.clone())
            .unwrap_or_else(|| params.video_encoder.clone());
        let bitrate_after = facts.as_ref().and_then(|f| f.bitrate_before).or_else(|| {
            duration_seconds
                .filter(|d| *d > 0.0)
                .map(|d| (size_after as f64 * 8.0 / d) as u64)
        });

        Ok(EncodeOutput {
            output_path: output_path.to_path_buf(),
            codec_after,
            size_after,
            bitrate_after,
        })
    }
}

/// Regexes for ffmpeg's `-progress` key=value stream.
struct ProgressPatterns {
    out_time: Option<Regex>,
    fps: Option<Regex>,
    speed: Option<Regex>,
}

impl ProgressPatterns {
    fn new() -> Self {
        Self {
            out_time: Regex::new(r"^out_time_(?:ms|us)=(\d+)").ok(),
            fps: Regex::new(r"^fps=(\d+\.?\d*)").ok(),
            speed: Regex::new(r"^speed=\s*(\d+\.?\d*)x").ok(),
        }
    }
}

fn capture<T: std::str::FromStr>(re: &Option<Regex>, line: &str) -> Option<T> {
    re.as_ref()?.captures(line)?.get(1)?.as_str().parse().ok()
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    fps: Option<f32>,
    speed: Option<f32>,
}

impl ProgressState {
    /// Feed one stderr line. Returns true when a progress block is complete.
    fn update(&mut self, line: &str, patterns: &ProgressPatterns) -> bool {
        // out_time_ms is microseconds despite its name.
        if let Some(us) = capture::<f64>(&patterns.out_time, line) {
            self.out_time_secs = us / 1_000_000.0;
        } else if let Some(fps) = capture(&patterns.fps, line) {
            self.fps = Some(fps);
        } else if let Some(speed) = capture(&patterns.speed, line) {
            self.speed = Some(speed);
        }
        line.starts_with("progress=")
    }

    fn snapshot(&self, duration_seconds: Option<f64>) -> EncodeProgress {
        let duration = duration_seconds.filter(|d| *d > 0.0);
        let percent = duration
            .map(|d| (self.out_time_secs / d * 100.0).clamp(0.0, 100.0) as f32)
            .unwrap_or(0.0);
        let eta_seconds = match (duration, self.speed) {
            (Some(d), Some(speed)) if speed > 0.0 => {
                Some(((d - self.out_time_secs).max(0.0)) / speed as f64)
            }
            _ => None,
        };

        EncodeProgress {
            percent,
            fps: self.fps,
            speed: self.speed,
            eta_seconds,
        }
    }
}

fn is_progress_line(line: &str) -> bool {
    line.split_once('=')
        .map(|(key, _)| !key.is_empty() && !key.contains(' '))
        .unwrap_or(false)
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn encode(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::Sender<EncodeProgress>,
    ) -> Result<EncodeOutput, EncoderError> {
        if !request.input_path.exists() {
            return Err(EncoderError::InputNotFound {
                path: request.input_path.clone(),
            });
        }
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let output_path = request
            .params
            .output_path(&request.input_path, &request.output_dir);
        let args = self.build_args(&request.input_path, &output_path, &request.params);
        debug!(job_id = %request.job_id, ?args, "Starting ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EncoderError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncoderError::encode_failed("ffmpeg stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let patterns = ProgressPatterns::new();
        let duration_seconds = request.duration_seconds;

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut state = ProgressState::default();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if !is_progress_line(&line) {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                    continue;
                }

                if state.update(&line, &patterns) {
                    // Non-blocking send
                    let _ = progress_tx.try_send(state.snapshot(duration_seconds));
                }
            }

            let status = child.wait().await?;
            let tail: Vec<String> = tail.into_iter().collect();
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, tail.join("\n")))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    let _ = tokio::fs::remove_file(&output_path).await;
                    return Err(EncoderError::encode_failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        (!error_output.is_empty()).then_some(error_output),
                    ));
                }
            }
            Ok(Err(e)) => return Err(EncoderError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_file(&output_path).await;
                return Err(EncoderError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        }

        self.describe_output(&output_path, &request.params, duration_seconds)
            .await
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EncoderError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EncoderError::encode_failed("ffmpeg -version failed", None));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_default_params() {
        let encoder = FfmpegEncoder::with_defaults();
        let args = encoder.build_args(
            Path::new("/work/in.avi"),
            Path::new("/work/in.encoded.mkv"),
            &EncodingParams::default(),
        );

        assert_eq!(args[0], "-y");
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx265"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "24"]));
        assert!(args.windows(2).any(|w| w == ["-preset", "medium"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-progress", "pipe:2"]));
        assert_eq!(args.last().unwrap(), "/work/in.encoded.mkv");
    }

    #[test]
    fn test_build_args_without_crf_and_with_extras() {
        let encoder = FfmpegEncoder::with_defaults();
        let params = EncodingParams {
            video_encoder: "libsvtav1".to_string(),
            crf: None,
            preset: None,
            extra_args: vec!["-pix_fmt".to_string(), "yuv420p10le".to_string()],
            ..EncodingParams::default()
        };
        let args = encoder.build_args(Path::new("in.mkv"), Path::new("out.mkv"), &params);

        assert!(!args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-preset".to_string()));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "yuv420p10le"]));
    }

    #[test]
    fn test_progress_block_parsing() {
        let patterns = ProgressPatterns::new();
        let mut state = ProgressState::default();

        assert!(!state.update("frame=1200", &patterns));
        assert!(!state.update("fps=48.5", &patterns));
        assert!(!state.update("out_time_ms=30000000", &patterns));
        assert!(!state.update("speed=2.00x", &patterns));
        assert!(state.update("progress=continue", &patterns));

        let progress = state.snapshot(Some(120.0));
        assert_eq!(progress.percent, 25.0);
        assert_eq!(progress.fps, Some(48.5));
        assert_eq!(progress.speed, Some(2.0));
        assert_eq!(progress.eta_seconds, Some(45.0));
    }

    #[test]
    fn test_progress_without_duration() {
        let patterns = ProgressPatterns::new();
        let mut state = ProgressState::default();
        state.update("out_time_us=5000000", &patterns);

        let progress = state.snapshot(None);
        assert_eq!(progress.percent, 0.0);
        assert_eq!(progress.eta_seconds, None);
    }

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("bitrate=1200.5kbits/s"));
        assert!(!is_progress_line("Error while decoding stream #0:0"));
        assert!(!is_progress_line("[libx265 @ 0x55] some message"));
    }

    #[tokio::test]
    async fn test_encode_missing_input() {
        let encoder = FfmpegEncoder::with_defaults();
        let (tx, _rx) = mpsc::channel(1);
        let result = encoder
            .encode(
                EncodeRequest {
                    job_id: "j".to_string(),
                    input_path: PathBuf::from("/nonexistent/in.avi"),
                    output_dir: std::env::temp_dir(),
                    params: EncodingParams::default(),
                    duration_seconds: None,
                },
                tx,
            )
            .await;
        assert!(matches!(result, Err(EncoderError::InputNotFound { .. })));
    }
}
