//! Export configuration and job management.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use storyreel_common::{
    ExportDefaults, ExportFormat, FrameRate, QualityPreset, StoryreelError, StoryreelResult,
};
use storyreel_project_model::{Project, Timeline};

use crate::compositor::compose_frame;
use crate::encoder::{
    audio_cues, available_formats, negotiate_format, EncodeSettings, FfmpegEncoder, FrameSink,
};
use crate::raster::FrameRenderer;
use crate::source::{FfmpegFrameSource, FrameSource};

/// Shortest export produced, even for an empty timeline.
pub const MIN_EXPORT_SECS: f64 = 5.0;

/// Nominal export frame rate.
pub const DEFAULT_EXPORT_FPS: u32 = 30;

/// Output resolution and bitrates for a quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

pub fn quality_settings(quality: QualityPreset) -> RenderSettings {
    match quality {
        QualityPreset::High => RenderSettings {
            width: 1920,
            height: 1080,
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
        },
        QualityPreset::Medium => RenderSettings {
            width: 1280,
            height: 720,
            video_bitrate_kbps: 5000,
            audio_bitrate_kbps: 160,
        },
        QualityPreset::Low => RenderSettings {
            width: 854,
            height: 480,
            video_bitrate_kbps: 2500,
            audio_bitrate_kbps: 128,
        },
    }
}

/// Seconds to export: the content end, never less than `min_secs`.
pub fn export_duration(timeline: &Timeline, min_secs: f64) -> f64 {
    let floor = if min_secs.is_finite() { min_secs.max(0.0) } else { MIN_EXPORT_SECS };
    timeline.content_end().max(floor)
}

/// `floor(duration * fps)` frames.
pub fn total_frames(duration_secs: f64, fps: u32) -> u64 {
    FrameRate::new(fps).frame_count(duration_secs)
}

/// Project title reduced to a safe file name stem.
///
/// Runs of characters other than ASCII letters and digits become a single
/// `_`; leading and trailing underscores are dropped.
pub fn sanitize_filename(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_sep = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

/// `{sanitized title}_export.{ext}`
pub fn output_file_name(title: &str, format: ExportFormat) -> String {
    format!("{}_export.{}", sanitize_filename(title), format.extension())
}

/// An export job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Directory the output file is written to.
    pub output_dir: PathBuf,

    pub quality: QualityPreset,

    /// Preferred container; the encoder may fall back to another.
    pub format: ExportFormat,

    pub fps: u32,

    pub min_duration_secs: f64,

    pub ffmpeg_path: String,

    pub ffprobe_path: String,

    /// Font for overlays and the placeholder card.
    pub font_path: Option<PathBuf>,
}

impl ExportJob {
    pub fn from_defaults(defaults: &ExportDefaults, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            quality: defaults.quality,
            format: defaults.format,
            fps: defaults.fps.max(1),
            min_duration_secs: defaults.min_duration_secs,
            ffmpeg_path: defaults.ffmpeg_path.clone(),
            ffprobe_path: defaults.ffprobe_path.clone(),
            font_path: defaults.font_path.clone(),
        }
    }

    /// Resolve the concrete plan for `project` in `format`.
    pub fn plan(&self, project: &Project, format: ExportFormat) -> ExportPlan {
        let fps = self.fps.max(1);
        let duration_secs = export_duration(&project.timeline, self.min_duration_secs);
        ExportPlan {
            format,
            settings: quality_settings(self.quality),
            fps,
            duration_secs,
            total_frames: total_frames(duration_secs, fps),
            output_path: self.output_dir.join(output_file_name(&project.title, format)),
        }
    }
}

/// Everything the frame loop needs to know.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportPlan {
    pub format: ExportFormat,
    pub settings: RenderSettings,
    pub fps: u32,
    pub duration_secs: f64,
    pub total_frames: u64,
    pub output_path: PathBuf,
}

impl ExportPlan {
    pub fn encode_settings(&self, ffmpeg_path: &str) -> EncodeSettings {
        EncodeSettings {
            ffmpeg_path: ffmpeg_path.to_string(),
            output_path: self.output_path.clone(),
            width: self.settings.width,
            height: self.settings.height,
            fps: self.fps,
            format: self.format,
            video_bitrate_kbps: self.settings.video_bitrate_kbps,
            audio_bitrate_kbps: self.settings.audio_bitrate_kbps,
            duration_secs: self.duration_secs,
        }
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExportStage {
    Preparing,
    Preloading,
    Rendering,
    Encoding,
    Finalizing,
    Complete,
    Failed,
}

fn progress_report(
    frames_rendered: u64,
    total_frames: u64,
    elapsed_secs: f64,
    stage: ExportStage,
) -> ExportProgress {
    let progress = if total_frames == 0 {
        0.0
    } else {
        (frames_rendered as f64 / total_frames as f64).clamp(0.0, 1.0)
    };

    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ExportProgress {
        progress,
        frames_rendered,
        total_frames,
        eta_secs,
        stage,
    }
}

/// What an export produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub output_path: Option<PathBuf>,
    pub format: ExportFormat,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_secs: f64,
    pub total_frames: u64,
    /// Frames that fell back to the placeholder because their clip's media
    /// could not be decoded.
    pub skipped_frames: u64,
    /// Sources that failed to preload or decode.
    pub failed_sources: Vec<String>,
    pub audio_muxed: bool,
    pub bytes: u64,
}

/// Busy flag that keeps exports from overlapping.
#[derive(Debug, Clone, Default)]
pub struct ExportLock {
    busy: Arc<AtomicBool>,
}

impl ExportLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock used by [`export_project`].
    pub fn global() -> &'static ExportLock {
        static GLOBAL: OnceLock<ExportLock> = OnceLock::new();
        GLOBAL.get_or_init(ExportLock::new)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Claim the lock; fails while another export holds it.
    pub fn try_acquire(&self) -> StoryreelResult<ExportGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| StoryreelError::ExportInProgress)?;
        Ok(ExportGuard {
            busy: self.busy.clone(),
        })
    }
}

/// Releases its [`ExportLock`] on drop.
#[derive(Debug)]
pub struct ExportGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

fn emit(progress: Option<&ProgressCallback>, report: ExportProgress) {
    if let Some(cb) = progress {
        cb(report);
    }
}

/// Export `project` to a video file with ffmpeg.
///
/// This is the main entry point for rendering. The project is only read;
/// a failed export leaves it untouched.
pub async fn export_project(
    project: &Project,
    job: &ExportJob,
    progress: Option<ProgressCallback>,
) -> StoryreelResult<ExportReport> {
    let _guard = ExportLock::global().try_acquire()?;
    tracing::info!(
        title = %project.title,
        output_dir = %job.output_dir.display(),
        quality = ?job.quality,
        "Starting export"
    );
    emit(
        progress.as_ref(),
        progress_report(0, 0, 0.0, ExportStage::Preparing),
    );

    if !command_exists(&job.ffmpeg_path).await {
        emit(progress.as_ref(), progress_report(0, 0, 0.0, ExportStage::Failed));
        return Err(StoryreelError::unsupported(format!(
            "No supported encoder found (expected {} in PATH)",
            job.ffmpeg_path
        )));
    }

    let formats = available_formats(&job.ffmpeg_path).await?;
    let Some(format) = negotiate_format(job.format, &formats) else {
        emit(progress.as_ref(), progress_report(0, 0, 0.0, ExportStage::Failed));
        return Err(StoryreelError::unsupported(
            "ffmpeg has neither libx264 nor libvpx-vp9",
        ));
    };
    if format != job.format {
        tracing::warn!(requested = ?job.format, using = ?format, "Requested format unavailable");
    }

    let plan = job.plan(project, format);
    let renderer = FrameRenderer::with_font_file(
        plan.settings.width,
        plan.settings.height,
        job.font_path.as_deref(),
    )?;
    std::fs::create_dir_all(&job.output_dir)?;

    let mut source = FfmpegFrameSource::new(&job.ffmpeg_path, &job.ffprobe_path, plan.fps);
    let mut sink = FfmpegEncoder::spawn(plan.encode_settings(&job.ffmpeg_path))?;

    run_export(project, &plan, &renderer, &mut source, &mut sink, progress.as_ref()).await
}

/// Render `project` through caller-supplied source and sink.
pub async fn render_with(
    lock: &ExportLock,
    project: &Project,
    plan: &ExportPlan,
    renderer: &FrameRenderer,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    progress: Option<&ProgressCallback>,
) -> StoryreelResult<ExportReport> {
    let _guard = lock.try_acquire()?;
    run_export(project, plan, renderer, source, sink, progress).await
}

async fn run_export(
    project: &Project,
    plan: &ExportPlan,
    renderer: &FrameRenderer,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    progress: Option<&ProgressCallback>,
) -> StoryreelResult<ExportReport> {
    let result = render_frames(project, plan, renderer, source, sink, progress).await;
    source.close().await;
    match result {
        Ok(report) => {
            emit(
                progress,
                progress_report(
                    plan.total_frames,
                    plan.total_frames,
                    0.0,
                    ExportStage::Complete,
                ),
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            sink.abort().await;
            emit(progress, progress_report(0, plan.total_frames, 0.0, ExportStage::Failed));
            Err(e)
        }
    }
}

async fn render_frames(
    project: &Project,
    plan: &ExportPlan,
    renderer: &FrameRenderer,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    progress: Option<&ProgressCallback>,
) -> StoryreelResult<ExportReport> {
    let started = std::time::Instant::now();
    let timeline = &project.timeline;
    let total = plan.total_frames;

    // Preload every referenced video source before the first frame.
    let mut urls: Vec<&str> = Vec::new();
    for clip in &timeline.video_track {
        if !urls.contains(&clip.source_url.as_str()) {
            urls.push(&clip.source_url);
        }
    }
    let mut failed: BTreeSet<String> = BTreeSet::new();
    for (i, url) in urls.iter().enumerate() {
        emit(
            progress,
            ExportProgress {
                progress: i as f64 / urls.len() as f64,
                frames_rendered: 0,
                total_frames: total,
                eta_secs: 0.0,
                stage: ExportStage::Preloading,
            },
        );
        if let Err(e) = source.preload(url).await {
            tracing::warn!(url = %url, error = %e, "Source unavailable; its frames use the placeholder");
            failed.insert(url.to_string());
        }
    }
    tracing::info!(
        sources = urls.len(),
        failed = failed.len(),
        total_frames = total,
        duration_secs = plan.duration_secs,
        "Sources preloaded"
    );

    let report_every = u64::from(plan.fps.max(1));
    let mut skipped = 0u64;
    for frame_index in 0..total {
        let composition = compose_frame(
            &project.title,
            timeline,
            frame_index,
            plan.fps,
            plan.duration_secs,
        );

        let video = match &composition.video {
            Some(layer) if !failed.contains(&layer.source_url) => {
                match source.frame_at(&layer.source_url, layer.local_time).await {
                    Ok(image) => Some(image),
                    Err(e) => {
                        tracing::warn!(
                            url = %layer.source_url,
                            time = composition.time_secs,
                            error = %e,
                            "Decode failed; using placeholder"
                        );
                        failed.insert(layer.source_url.clone());
                        skipped += 1;
                        None
                    }
                }
            }
            Some(_) => {
                skipped += 1;
                None
            }
            None => None,
        };

        let frame = renderer.render(&composition, video.as_ref());
        sink.write_frame(&frame).await?;

        let rendered = frame_index + 1;
        if rendered % report_every == 0 || rendered == total {
            emit(
                progress,
                progress_report(
                    rendered,
                    total,
                    started.elapsed().as_secs_f64(),
                    ExportStage::Rendering,
                ),
            );
        }
        tokio::task::yield_now().await;
    }

    emit(
        progress,
        progress_report(total, total, started.elapsed().as_secs_f64(), ExportStage::Encoding),
    );
    let cues = audio_cues(timeline);
    let encoded = sink.finish(&cues).await?;
    if !cues.is_empty() && !encoded.audio_muxed {
        tracing::warn!(clips = cues.len(), "Exported without audio");
    }

    emit(
        progress,
        progress_report(total, total, started.elapsed().as_secs_f64(), ExportStage::Finalizing),
    );
    tracing::info!(
        elapsed_secs = started.elapsed().as_secs_f64(),
        frames = total,
        skipped_frames = skipped,
        "Export finished"
    );

    Ok(ExportReport {
        output_path: encoded.path,
        format: plan.format,
        mime_type: plan.format.mime_type().to_string(),
        width: plan.settings.width,
        height: plan.settings.height,
        fps: plan.fps,
        duration_secs: plan.duration_secs,
        total_frames: total,
        skipped_frames: skipped,
        failed_sources: failed.into_iter().collect(),
        audio_muxed: encoded.audio_muxed,
        bytes: encoded.bytes,
    })
}

/// Whether `binary` (a name on PATH or a path) runs `-version` successfully.
async fn command_exists(binary: &str) -> bool {
    tokio::process::Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_project_model::{Clip, MediaType, OverlayPosition};

    #[test]
    fn test_quality_presets() {
        let high = quality_settings(QualityPreset::High);
        assert_eq!((high.width, high.height), (1920, 1080));
        let medium = quality_settings(QualityPreset::Medium);
        assert_eq!((medium.width, medium.height), (1280, 720));
        let low = quality_settings(QualityPreset::Low);
        assert_eq!((low.width, low.height), (854, 480));
        assert!(high.video_bitrate_kbps > medium.video_bitrate_kbps);
        assert!(medium.video_bitrate_kbps > low.video_bitrate_kbps);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Film: Part #2!"), "My_Film_Part_2");
        assert_eq!(sanitize_filename("  ***  "), "untitled");
        assert_eq!(sanitize_filename("Déjà vu"), "D_j_vu");
        assert_eq!(
            output_file_name("Space Cats", ExportFormat::Webm),
            "Space_Cats_export.webm"
        );
    }

    #[test]
    fn test_duration_floor_and_frame_count() {
        let mut timeline = Timeline::new();
        assert_eq!(export_duration(&timeline, MIN_EXPORT_SECS), 5.0);
        assert_eq!(total_frames(5.0, 30), 150);

        let mut clip = Clip::new("c", "C", MediaType::Video, "c.mp4", 7.5);
        clip.start_time = 0.0;
        clip.end_time = 7.5;
        timeline.insert(clip);
        timeline.add_overlay("late", 8.0, Some(1.01), OverlayPosition::Center, None);
        let d = export_duration(&timeline, MIN_EXPORT_SECS);
        assert!((d - 9.01).abs() < 1e-9);
        assert_eq!(total_frames(d, 30), 270);
        assert_eq!(total_frames(f64::NAN, 30), 0);
    }

    #[test]
    fn test_plan_uses_job_settings() {
        let job = ExportJob::from_defaults(&ExportDefaults::default(), "/tmp/exports");
        let project = Project::new("Demo Reel");
        let plan = job.plan(&project, ExportFormat::Mp4);
        assert_eq!(plan.output_path, PathBuf::from("/tmp/exports/Demo_Reel_export.mp4"));
        assert_eq!(plan.total_frames, 150);
        assert_eq!(plan.settings.width, 1920);
    }

    #[test]
    fn test_export_lock_prevents_reentry() {
        let lock = ExportLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_busy());
        assert!(matches!(
            lock.try_acquire(),
            Err(StoryreelError::ExportInProgress)
        ));
        drop(guard);
        assert!(!lock.is_busy());
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn test_progress_report_eta() {
        let p = progress_report(50, 100, 10.0, ExportStage::Rendering);
        assert!((p.progress - 0.5).abs() < 1e-9);
        assert!((p.eta_secs - 10.0).abs() < 1e-9);
        let empty = progress_report(0, 0, 3.0, ExportStage::Preparing);
        assert_eq!(empty.progress, 0.0);
        assert_eq!(empty.eta_secs, 0.0);
    }

    #[tokio::test]
    async fn test_command_exists_for_missing_binary() {
        assert!(!command_exists("/nonexistent/storyreel-ffmpeg").await);
        assert!(!command_exists("storyreel-definitely-not-a-binary").await);
    }

    #[tokio::test]
    async fn test_command_exists_does_not_go_through_a_shell() {
        assert!(!command_exists("storyreel-missing-ffmpeg; true").await);
        assert!(!command_exists("$(true)").await);
    }
}
