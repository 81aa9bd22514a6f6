//! FFprobe-based media probe.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{MediaProbe, ProbeError};
use crate::job::MediaFacts;
use crate::transfer::resolve_remote;

/// Probes files on a locally mounted remote root with ffprobe.
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    remote_root: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<PathBuf>, remote_root: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            remote_root: remote_root.into(),
        }
    }

    /// Probe any local file.
    pub async fn probe_file(&self, path: &Path) -> Result<MediaFacts, ProbeError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProbeError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                ProbeError::Io(e)
            }
        })?;

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::FfprobeNotFound {
                        path: self.ffprobe_path.clone(),
                    }
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ProbeError::ProbeFailed {
                reason: format!(
                    "ffprobe failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut facts = parse_probe_output(&stdout)?;
        if facts.size_before == 0 {
            facts.size_before = metadata.len();
        }
        Ok(facts)
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn probe(&self, remote_path: &str) -> Result<MediaFacts, ProbeError> {
        let path = resolve_remote(&self.remote_root, remote_path).ok_or_else(|| {
            ProbeError::ProbeFailed {
                reason: format!("path escapes the remote root: {}", remote_path),
            }
        })?;
        self.probe_file(&path).await
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

fn count_streams(streams: &[ProbeStream], kind: &str) -> u32 {
    streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some(kind))
        .count() as u32
}

/// Parses ffprobe JSON output into media facts.
pub(crate) fn parse_probe_output(output: &str) -> Result<MediaFacts, ProbeError> {
    let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| ProbeError::ParseError {
        reason: format!("Failed to parse ffprobe output: {}", e),
    })?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    Ok(MediaFacts {
        size_before: probe
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        codec_before: video.and_then(|s| s.codec_name.clone()),
        container: probe
            .format
            .format_name
            .as_deref()
            .and_then(|name| name.split(',').next())
            .map(str::to_string),
        resolution: video.and_then(|s| match (s.width, s.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }),
        bitrate_before: probe.format.bit_rate.as_deref().and_then(|b| b.parse().ok()),
        duration_seconds: probe.format.duration.as_deref().and_then(|d| d.parse().ok()),
        audio_track_count: count_streams(&probe.streams, "audio"),
        subtitle_track_count: count_streams(&probe.streams, "subtitle"),
    })
}
