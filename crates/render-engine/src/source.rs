//! Frame sources: decoded video frames addressed by clip-local time.
//!
//! The export loop owns its source exclusively, separate from any preview
//! player, so decoding for export never disturbs playback state.

use std::collections::HashMap;
use std::process::Stdio;

use image::RgbaImage;
use storyreel_common::FrameRate;
use storyreel_playback::{FfprobeProbe, MediaError, MediaMetadata, MetadataProbe};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// Decodes frames of video sources for export.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Prepare `url` for decoding; completes once the source is usable.
    async fn preload(&mut self, url: &str) -> Result<MediaMetadata, MediaError>;

    /// The frame of `url` shown at `local_time` seconds into the source.
    async fn frame_at(&mut self, url: &str, local_time: f64) -> Result<RgbaImage, MediaError>;

    /// Release every decoder.
    async fn close(&mut self) {}

    /// Source name.
    fn name(&self) -> &str;
}

/// What to do with a running sequential decoder for a requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeAction {
    /// The target is the decoder's next frame.
    ReadNext,
    /// The target still shows the previously decoded frame.
    RepeatLast,
    /// The target is elsewhere; restart the decoder there.
    Restart,
}

pub(crate) fn decode_action(next_time: f64, interval: f64, target: f64, has_last: bool) -> DecodeAction {
    let half = interval / 2.0;
    if (target - next_time).abs() < half {
        DecodeAction::ReadNext
    } else if has_last && target < next_time && target >= next_time - interval - half {
        DecodeAction::RepeatLast
    } else {
        DecodeAction::Restart
    }
}

/// A running `ffmpeg` process emitting raw RGBA frames at a fixed rate.
struct StreamDecoder {
    child: Child,
    stdout: ChildStdout,
    frame_size: usize,
    width: u32,
    height: u32,
    next_time: f64,
    interval: f64,
    last: Option<RgbaImage>,
}

impl StreamDecoder {
    fn spawn(
        ffmpeg_path: &str,
        url: &str,
        start: f64,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, MediaError> {
        let mut child = Command::new(ffmpeg_path)
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", start.max(0.0)))
            .arg("-i")
            .arg(url)
            .args(["-vf"])
            .arg(format!("fps={fps},scale={width}:{height}"))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::Decode {
                url: url.to_string(),
                reason: format!("failed to start {ffmpeg_path}: {e}"),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| MediaError::Decode {
            url: url.to_string(),
            reason: "decoder stdout unavailable".to_string(),
        })?;

        tracing::debug!(url = %url, start, fps, "Started frame decoder");
        Ok(Self {
            child,
            stdout,
            frame_size: width as usize * height as usize * 4,
            width,
            height,
            next_time: start.max(0.0),
            interval: FrameRate::new(fps).interval_secs(),
            last: None,
        })
    }

    async fn read_next(&mut self, url: &str) -> Result<RgbaImage, MediaError> {
        let mut buffer = vec![0u8; self.frame_size];
        match self.stdout.read_exact(&mut buffer).await {
            Ok(_) => {
                self.next_time += self.interval;
                let frame = RgbaImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
                    MediaError::Decode {
                        url: url.to_string(),
                        reason: "short frame buffer".to_string(),
                    }
                })?;
                self.last = Some(frame.clone());
                Ok(frame)
            }
            // Past the end of the source: hold the final frame.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.last.clone().ok_or_else(|| MediaError::Decode {
                    url: url.to_string(),
                    reason: "no frames decoded".to_string(),
                })
            }
            Err(e) => Err(MediaError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn stop(mut self) {
        let _ = self.child.kill().await;
    }
}

struct SourceEntry {
    meta: MediaMetadata,
    decoder: Option<StreamDecoder>,
}

/// Frame source that decodes through `ffmpeg`, one sequential decoder per
/// source, restarted only when the requested time jumps.
pub struct FfmpegFrameSource {
    ffmpeg_path: String,
    probe: FfprobeProbe,
    fps: u32,
    pool: HashMap<String, SourceEntry>,
}

impl FfmpegFrameSource {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>, fps: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            probe: FfprobeProbe::new(ffprobe_path),
            fps: fps.max(1),
            pool: HashMap::new(),
        }
    }

    /// Number of preloaded sources.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }
}

#[async_trait::async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn preload(&mut self, url: &str) -> Result<MediaMetadata, MediaError> {
        if let Some(entry) = self.pool.get(url) {
            return Ok(entry.meta);
        }

        let meta = self.probe.probe(url).await?;
        let (Some(width), Some(height)) = (meta.width, meta.height) else {
            return Err(MediaError::Decode {
                url: url.to_string(),
                reason: "no video stream".to_string(),
            });
        };

        let mut decoder = StreamDecoder::spawn(&self.ffmpeg_path, url, 0.0, self.fps, width, height)?;
        // Decode the first frame up front; a request for time 0 repeats it.
        decoder.read_next(url).await?;

        self.pool.insert(
            url.to_string(),
            SourceEntry {
                meta,
                decoder: Some(decoder),
            },
        );
        tracing::info!(url = %url, width, height, duration = meta.duration_secs, "Preloaded source");
        Ok(meta)
    }

    async fn frame_at(&mut self, url: &str, local_time: f64) -> Result<RgbaImage, MediaError> {
        if !self.pool.contains_key(url) {
            self.preload(url).await?;
        }
        let fps = self.fps;
        let ffmpeg_path = self.ffmpeg_path.clone();
        let entry = self.pool.get_mut(url).ok_or_else(|| MediaError::UnsupportedSource {
            url: url.to_string(),
        })?;
        let (Some(width), Some(height)) = (entry.meta.width, entry.meta.height) else {
            return Err(MediaError::Decode {
                url: url.to_string(),
                reason: "no video stream".to_string(),
            });
        };

        let action = match &entry.decoder {
            Some(d) => decode_action(d.next_time, d.interval, local_time, d.last.is_some()),
            None => DecodeAction::Restart,
        };

        match action {
            DecodeAction::ReadNext => {}
            DecodeAction::RepeatLast => {
                if let Some(frame) = entry.decoder.as_ref().and_then(|d| d.last.clone()) {
                    return Ok(frame);
                }
            }
            DecodeAction::Restart => {
                if let Some(old) = entry.decoder.take() {
                    old.stop().await;
                }
                entry.decoder = Some(StreamDecoder::spawn(
                    &ffmpeg_path,
                    url,
                    local_time,
                    fps,
                    width,
                    height,
                )?);
            }
        }

        match entry.decoder.as_mut() {
            Some(decoder) => decoder.read_next(url).await,
            None => Err(MediaError::Decode {
                url: url.to_string(),
                reason: "decoder not running".to_string(),
            }),
        }
    }

    async fn close(&mut self) {
        for (_, entry) in self.pool.drain() {
            if let Some(decoder) = entry.decoder {
                decoder.stop().await;
            }
        }
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f64 = 1.0 / 30.0;

    #[test]
    fn test_sequential_request_reads_next() {
        assert_eq!(decode_action(1.0, STEP, 1.0, true), DecodeAction::ReadNext);
        assert_eq!(decode_action(1.0, STEP, 1.01, true), DecodeAction::ReadNext);
    }

    #[test]
    fn test_same_frame_request_repeats() {
        assert_eq!(decode_action(1.0, STEP, 1.0 - STEP, true), DecodeAction::RepeatLast);
        assert_eq!(decode_action(1.0, STEP, 1.0 - STEP, false), DecodeAction::Restart);
    }

    #[test]
    fn test_jumps_restart() {
        assert_eq!(decode_action(1.0, STEP, 5.0, true), DecodeAction::Restart);
        assert_eq!(decode_action(1.0, STEP, 0.2, true), DecodeAction::Restart);
    }

    #[tokio::test]
    async fn test_unprobeable_source_fails_preload() {
        let mut source = FfmpegFrameSource::new(
            "/nonexistent/storyreel-ffmpeg",
            "/nonexistent/storyreel-ffprobe",
            30,
        );
        assert!(source.preload("clip.mp4").await.is_err());
        assert_eq!(source.pooled(), 0);
    }
}
