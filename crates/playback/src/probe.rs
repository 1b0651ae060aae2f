//! Metadata probing through `ffprobe`.

use serde::Deserialize;
use tokio::process::Command;

use crate::media::{MediaError, MediaMetadata, MetadataProbe};

/// Probes duration and dimensions by shelling out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: String,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.ffprobe_path
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_ffprobe_json(url: &str, raw: &str) -> Result<MediaMetadata, MediaError> {
    let parsed: ProbeOutput = serde_json::from_str(raw).map_err(|e| MediaError::Probe {
        url: url.to_string(),
        reason: format!("unreadable ffprobe output: {e}"),
    })?;

    let parse_secs = |s: &Option<String>| {
        s.as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
    };

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| parse_secs(&f.duration))
        .or_else(|| parsed.streams.iter().find_map(|s| parse_secs(&s.duration)))
        .ok_or_else(|| MediaError::Probe {
            url: url.to_string(),
            reason: "no duration reported".to_string(),
        })?;

    Ok(MediaMetadata {
        duration_secs,
        width: video.and_then(|s| s.width).filter(|w| *w > 0),
        height: video.and_then(|s| s.height).filter(|h| *h > 0),
    })
}

#[async_trait::async_trait]
impl MetadataProbe for FfprobeProbe {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, MediaError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(url)
            .output()
            .await
            .map_err(|e| MediaError::Probe {
                url: url.to_string(),
                reason: format!("failed to run {}: {e}", self.ffprobe_path),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::Probe {
                url: url.to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let meta = parse_ffprobe_json(url, &raw)?;
        tracing::debug!(
            url = %url,
            duration = meta.duration_secs,
            width = ?meta.width,
            height = ?meta.height,
            "Probed media"
        );
        Ok(meta)
    }
}
