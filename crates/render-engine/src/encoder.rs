//! Frame sinks: where rendered frames go.
//!
//! [`FfmpegEncoder`] streams raw RGBA frames into an `ffmpeg` process over
//! stdin, then muxes the audio track in a second pass. Audio is best effort:
//! if the mux fails the video-only encode becomes the output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use image::RgbaImage;
use storyreel_common::{ExportFormat, StoryreelError, StoryreelResult};
use storyreel_project_model::Timeline;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

/// Encoder failures.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder pipe closed: {0}")]
    Pipe(String),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Frame is {got:?}, encoder expects {expected:?}")]
    FrameSize {
        got: (u32, u32),
        expected: (u32, u32),
    },
}

impl From<EncodeError> for StoryreelError {
    fn from(err: EncodeError) -> Self {
        StoryreelError::render(err.to_string())
    }
}

/// One audio clip to mix into the export.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCue {
    pub source_url: String,
    /// Timeline position of the clip start.
    pub start_secs: f64,
    /// Seconds of source audio to use.
    pub span_secs: f64,
}

/// Audio cues for every clip on the audio track.
pub fn audio_cues(timeline: &Timeline) -> Vec<AudioCue> {
    timeline
        .audio_track
        .iter()
        .filter(|c| c.span() > 0.0)
        .map(|c| AudioCue {
            source_url: c.source_url.clone(),
            start_secs: c.start_time,
            span_secs: c.span(),
        })
        .collect()
}

/// Result of finishing a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    /// Output file, for sinks that write one.
    pub path: Option<PathBuf>,
    pub bytes: u64,
    pub audio_muxed: bool,
}

/// Consumes rendered frames in order.
#[async_trait::async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &RgbaImage) -> StoryreelResult<()>;

    /// Flush everything and produce the output, mixing in `audio` if the sink
    /// can.
    async fn finish(&mut self, audio: &[AudioCue]) -> StoryreelResult<EncodedOutput>;

    /// Abandon the output after a failure.
    async fn abort(&mut self) {}

    fn name(&self) -> &str;
}

/// Encoder parameters.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub ffmpeg_path: String,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: ExportFormat,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub duration_secs: f64,
}

impl EncodeSettings {
    /// Where the video-only pass is written before audio is muxed.
    pub fn video_only_path(&self) -> PathBuf {
        let stem = self
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "export".to_string());
        self.output_path
            .with_file_name(format!("{stem}.video-only.{}", self.format.extension()))
    }
}

fn video_codec_args(settings: &EncodeSettings) -> Vec<String> {
    let bitrate = format!("{}k", settings.video_bitrate_kbps.max(500));
    let gop = settings.fps.max(1).to_string();
    match settings.format {
        ExportFormat::Mp4 => vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-profile:v".to_string(),
            "high".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-b:v".to_string(),
            bitrate,
            "-g".to_string(),
            gop,
            "-movflags".to_string(),
            "+faststart".to_string(),
        ],
        ExportFormat::Webm => vec![
            "-c:v".to_string(),
            "libvpx-vp9".to_string(),
            "-b:v".to_string(),
            bitrate,
            "-g".to_string(),
            gop,
            "-deadline".to_string(),
            "good".to_string(),
            "-cpu-used".to_string(),
            "4".to_string(),
        ],
    }
}

/// Arguments for the video pass: raw RGBA on stdin, no audio.
pub fn video_pass_args(settings: &EncodeSettings) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", settings.width, settings.height),
        "-r".to_string(),
        settings.fps.max(1).to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
    ];
    args.extend(video_codec_args(settings));
    args.push(settings.video_only_path().to_string_lossy().to_string());
    args
}

/// Filter graph delaying each cue to its timeline position and mixing them
/// into `[aout]`. Input 0 is the video, so cue `i` is input `i + 1`.
pub fn build_audio_filter(cues: &[AudioCue]) -> Option<String> {
    if cues.is_empty() {
        return None;
    }

    let single = cues.len() == 1;
    let mut parts = Vec::with_capacity(cues.len() + 1);
    let mut labels = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let delay_ms = (cue.start_secs.max(0.0) * 1000.0).round() as u64;
        let label = if single {
            "aout".to_string()
        } else {
            format!("a{i}")
        };
        parts.push(format!(
            "[{}:a]atrim=0:{:.3},asetpts=PTS-STARTPTS,adelay={delay_ms}|{delay_ms}[{label}]",
            i + 1,
            cue.span_secs.max(0.0),
        ));
        labels.push_str(&format!("[{label}]"));
    }
    if !single {
        parts.push(format!(
            "{labels}amix=inputs={}:duration=longest:dropout_transition=0[aout]",
            cues.len()
        ));
    }
    Some(parts.join(";"))
}

/// Arguments for the audio pass: copy the video, mix the cues.
pub fn mux_pass_args(settings: &EncodeSettings, cues: &[AudioCue]) -> Option<Vec<String>> {
    let filter = build_audio_filter(cues)?;
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        settings.video_only_path().to_string_lossy().to_string(),
    ];
    for cue in cues {
        args.push("-i".to_string());
        args.push(cue.source_url.clone());
    }
    let audio_codec = match settings.format {
        ExportFormat::Mp4 => "aac",
        ExportFormat::Webm => "libopus",
    };
    args.extend([
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "[aout]".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        audio_codec.to_string(),
        "-b:a".to_string(),
        format!("{}k", settings.audio_bitrate_kbps.max(64)),
        "-t".to_string(),
        format!("{:.3}", settings.duration_secs.max(0.0)),
    ]);
    args.push(settings.output_path.to_string_lossy().to_string());
    Some(args)
}

/// Formats whose video encoder appears in `ffmpeg -encoders` output.
pub fn parse_encoder_listing(listing: &str) -> Vec<ExportFormat> {
    let has = |name: &str| {
        listing
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(name))
    };
    let mut formats = Vec::new();
    if has("libx264") {
        formats.push(ExportFormat::Mp4);
    }
    if has("libvpx-vp9") {
        formats.push(ExportFormat::Webm);
    }
    formats
}

/// Query the encoders compiled into `ffmpeg_path`.
pub async fn available_formats(ffmpeg_path: &str) -> StoryreelResult<Vec<ExportFormat>> {
    let output = Command::new(ffmpeg_path)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| StoryreelError::unsupported(format!("Cannot run {ffmpeg_path}: {e}")))?;
    if !output.status.success() {
        return Err(StoryreelError::unsupported(format!(
            "{ffmpeg_path} -encoders exited with {}",
            output.status
        )));
    }
    Ok(parse_encoder_listing(&String::from_utf8_lossy(&output.stdout)))
}

/// The preferred format if available, otherwise any available one.
pub fn negotiate_format(preferred: ExportFormat, available: &[ExportFormat]) -> Option<ExportFormat> {
    if available.contains(&preferred) {
        Some(preferred)
    } else {
        available.first().copied()
    }
}

fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(tokio::spawn(async move {
        let mut output = String::new();
        match stderr.read_to_string(&mut output).await {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    }))
}

async fn collect_stderr(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string()),
        None => String::new(),
    }
}

/// Streams frames into `ffmpeg`.
pub struct FfmpegEncoder {
    settings: EncodeSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn spawn(settings: EncodeSettings) -> StoryreelResult<Self> {
        if let Some(parent) = settings.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let args = video_pass_args(&settings);
        tracing::debug!(args = ?args, "Running ffmpeg video pass");
        let mut child = Command::new(&settings.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                binary: settings.ffmpeg_path.clone(),
                source,
            })?;

        tracing::info!(
            pid = child.id(),
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            format = ?settings.format,
            "ffmpeg encoder started"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncodeError::Pipe("stdin unavailable".to_string()))?;
        let stderr_task = drain_stderr(&mut child);

        Ok(Self {
            settings,
            child: Some(child),
            stdin: Some(stdin),
            stderr_task,
            frames: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    async fn wait_video_pass(&mut self) -> StoryreelResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Err(EncodeError::Pipe("encoder already finished".to_string()).into());
        };
        let status = child
            .wait()
            .await
            .map_err(|e| EncodeError::Pipe(format!("failed to wait on ffmpeg: {e}")))?;
        let stderr = collect_stderr(self.stderr_task.take()).await;
        if !status.success() {
            return Err(EncodeError::Failed {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Second pass: copy the video stream and mix the audio cues in.
async fn mux_audio(settings: &EncodeSettings, cues: &[AudioCue]) -> Result<(), EncodeError> {
    let Some(args) = mux_pass_args(settings, cues) else {
        return Err(EncodeError::Pipe("no audio to mux".to_string()));
    };
    tracing::debug!(args = ?args, "Running ffmpeg audio pass");
    let output = Command::new(&settings.ffmpeg_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| EncodeError::Spawn {
            binary: settings.ffmpeg_path.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(EncodeError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Mix `audio` into the output, falling back to the video-only pass when
/// there is no audio or the mux fails. Returns whether audio made it in.
async fn mux_or_keep_video(settings: &EncodeSettings, audio: &[AudioCue]) -> StoryreelResult<bool> {
    let audio_muxed = if audio.is_empty() {
        false
    } else {
        match mux_audio(settings, audio).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Audio mux failed; keeping video-only export");
                false
            }
        }
    };
    settle_output(&settings.video_only_path(), &settings.output_path, audio_muxed)?;
    Ok(audio_muxed)
}

/// Leave exactly one file at `output`: the muxed file when audio went in,
/// otherwise the video-only pass moved into place.
fn settle_output(video_only: &Path, output: &Path, audio_muxed: bool) -> std::io::Result<()> {
    if audio_muxed {
        if let Err(e) = std::fs::remove_file(video_only) {
            tracing::debug!(error = %e, "Could not remove video-only pass");
        }
        Ok(())
    } else {
        std::fs::rename(video_only, output)
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[async_trait::async_trait]
impl FrameSink for FfmpegEncoder {
    async fn write_frame(&mut self, frame: &RgbaImage) -> StoryreelResult<()> {
        let expected = (self.settings.width, self.settings.height);
        if frame.dimensions() != expected {
            return Err(EncodeError::FrameSize {
                got: frame.dimensions(),
                expected,
            }
            .into());
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EncodeError::Pipe("encoder input closed".to_string()))?;
        if let Err(e) = stdin.write_all(frame.as_raw()).await {
            // ffmpeg died; its stderr says why.
            drop(self.stdin.take());
            let stderr = collect_stderr(self.stderr_task.take()).await;
            return Err(EncodeError::Pipe(format!("{e}: {}", stderr.trim())).into());
        }
        self.frames += 1;
        Ok(())
    }

    async fn finish(&mut self, audio: &[AudioCue]) -> StoryreelResult<EncodedOutput> {
        self.wait_video_pass().await?;
        let audio_muxed = mux_or_keep_video(&self.settings, audio).await?;
        let output = self.settings.output_path.clone();

        let bytes = file_size(&output);
        tracing::info!(
            path = %output.display(),
            bytes,
            frames = self.frames,
            audio_muxed,
            "Encoding finished"
        );
        Ok(EncodedOutput {
            path: Some(output),
            bytes,
            audio_muxed,
        })
    }

    async fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        let _ = collect_stderr(self.stderr_task.take()).await;
        let _ = std::fs::remove_file(self.settings.video_only_path());
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Sink that keeps frames in memory; used for dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Vec<RgbaImage>,
    count: u64,
    keep_frames: bool,
    bytes: u64,
}

impl MemorySink {
    /// Count frames without keeping them.
    pub fn counting() -> Self {
        Self::default()
    }

    /// Keep every frame.
    pub fn keeping() -> Self {
        Self {
            keep_frames: true,
            ..Self::default()
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.count
    }

    pub fn frames(&self) -> &[RgbaImage] {
        &self.frames
    }
}

#[async_trait::async_trait]
impl FrameSink for MemorySink {
    async fn write_frame(&mut self, frame: &RgbaImage) -> StoryreelResult<()> {
        self.count += 1;
        self.bytes += frame.as_raw().len() as u64;
        if self.keep_frames {
            self.frames.push(frame.clone());
        }
        Ok(())
    }

    async fn finish(&mut self, _audio: &[AudioCue]) -> StoryreelResult<EncodedOutput> {
        Ok(EncodedOutput {
            path: None,
            bytes: self.bytes,
            audio_muxed: false,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
