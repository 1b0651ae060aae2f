//! Export frame loop over in-memory sources and sinks.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};
use proptest::prelude::*;
use storyreel_common::{ExportFormat, StoryreelError, StoryreelResult};
use storyreel_playback::{MediaError, MediaMetadata};
use storyreel_project_model::{Clip, MediaType, OverlayPosition, Project};
use storyreel_render_engine::{
    export_duration, render_with, total_frames, AudioCue, EncodedOutput, ExportLock, ExportPlan,
    ExportProgress, ExportStage, FrameRenderer, FrameSink, FrameSource, MemorySink,
    ProgressCallback, RenderSettings, MIN_EXPORT_SECS,
};

const W: u32 = 32;
const H: u32 = 18;
const GREEN: Rgba<u8> = Rgba([0, 200, 0, 255]);

/// Solid-color frames for every url except the broken ones.
#[derive(Default)]
struct SolidSource {
    broken: Vec<String>,
    preloaded: Vec<String>,
    requests: Vec<(String, f64)>,
    closed: bool,
}

#[async_trait::async_trait]
impl FrameSource for SolidSource {
    async fn preload(&mut self, url: &str) -> Result<MediaMetadata, MediaError> {
        self.preloaded.push(url.to_string());
        if self.broken.iter().any(|b| b == url) {
            return Err(MediaError::Decode {
                url: url.to_string(),
                reason: "corrupt".to_string(),
            });
        }
        Ok(MediaMetadata {
            duration_secs: 60.0,
            width: Some(W),
            height: Some(H),
        })
    }

    async fn frame_at(&mut self, url: &str, local_time: f64) -> Result<RgbaImage, MediaError> {
        self.requests.push((url.to_string(), local_time));
        Ok(RgbaImage::from_pixel(W, H, GREEN))
    }

    async fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        "solid"
    }
}

/// Sink whose writes start failing after `fail_after` frames.
struct FailingSink {
    fail_after: u64,
    written: u64,
    aborted: bool,
}

#[async_trait::async_trait]
impl FrameSink for FailingSink {
    async fn write_frame(&mut self, _frame: &RgbaImage) -> StoryreelResult<()> {
        if self.written >= self.fail_after {
            return Err(StoryreelError::render("encoder pipe closed"));
        }
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self, _audio: &[AudioCue]) -> StoryreelResult<EncodedOutput> {
        Ok(EncodedOutput {
            path: None,
            bytes: 0,
            audio_muxed: false,
        })
    }

    async fn abort(&mut self) {
        self.aborted = true;
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn placed(id: &str, media: MediaType, url: &str, start: f64, end: f64) -> Clip {
    let mut c = Clip::new(id, id, media, url, end - start);
    c.start_time = start;
    c.end_time = end;
    c
}

fn plan_for(project: &Project, fps: u32) -> ExportPlan {
    let duration_secs = export_duration(&project.timeline, MIN_EXPORT_SECS);
    ExportPlan {
        format: ExportFormat::Mp4,
        settings: RenderSettings {
            width: W,
            height: H,
            video_bitrate_kbps: 1000,
            audio_bitrate_kbps: 128,
        },
        fps,
        duration_secs,
        total_frames: total_frames(duration_secs, fps),
        output_path: PathBuf::from("/tmp/unused.mp4"),
    }
}

#[tokio::test]
async fn empty_project_exports_minimum_length_placeholder() {
    let project = Project::new("Nothing Yet");
    let plan = plan_for(&project, 30);
    let renderer = FrameRenderer::new(W, H, None);
    let mut source = SolidSource::default();
    let mut sink = MemorySink::counting();

    let report = render_with(
        &ExportLock::new(),
        &project,
        &plan,
        &renderer,
        &mut source,
        &mut sink,
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.total_frames, 150);
    assert_eq!(sink.frame_count(), 150);
    assert_eq!(report.skipped_frames, 0);
    assert!(source.requests.is_empty());
    assert!(source.closed);
    assert_eq!(report.mime_type, "video/mp4");
}

#[tokio::test]
async fn frames_follow_the_timeline() {
    let mut project = Project::new("Two Shots");
    project
        .timeline
        .insert(placed("a", MediaType::Video, "a.mp4", 0.0, 2.0));
    project
        .timeline
        .insert(placed("b", MediaType::Video, "b.mp4", 4.0, 6.0));
    let plan = plan_for(&project, 10);
    let renderer = FrameRenderer::new(W, H, None);
    let mut source = SolidSource::default();
    let mut sink = MemorySink::keeping();

    let report = render_with(
        &ExportLock::new(),
        &project,
        &plan,
        &renderer,
        &mut source,
        &mut sink,
        None,
    )
    .await
    .unwrap();

    // Content ends at 6s, above the 5s floor.
    assert_eq!(report.total_frames, 60);
    assert_eq!(source.preloaded, vec!["a.mp4", "b.mp4"]);

    let frames = sink.frames();
    assert_eq!(*frames[0].get_pixel(0, 0), GREEN);
    // 3.0s falls in the gap.
    assert_ne!(*frames[30].get_pixel(0, 0), GREEN);
    assert_eq!(*frames[45].get_pixel(0, 0), GREEN);

    // Second clip is read from its own start.
    let (url, local) = source
        .requests
        .iter()
        .find(|(url, _)| url == "b.mp4")
        .cloned()
        .unwrap();
    assert_eq!(url, "b.mp4");
    assert!(local.abs() < 1e-9);
}

#[tokio::test]
async fn broken_source_falls_back_to_placeholder() {
    let mut project = Project::new("Broken");
    project
        .timeline
        .insert(placed("a", MediaType::Video, "good.mp4", 0.0, 3.0));
    project
        .timeline
        .insert(placed("b", MediaType::Video, "bad.mp4", 3.0, 6.0));
    let plan = plan_for(&project, 10);
    let renderer = FrameRenderer::new(W, H, None);
    let mut source = SolidSource {
        broken: vec!["bad.mp4".to_string()],
        ..SolidSource::default()
    };
    let mut sink = MemorySink::keeping();

    let report = render_with(
        &ExportLock::new(),
        &project,
        &plan,
        &renderer,
        &mut source,
        &mut sink,
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.total_frames, 60);
    assert_eq!(report.skipped_frames, 30);
    assert_eq!(report.failed_sources, vec!["bad.mp4".to_string()]);
    assert!(source.requests.iter().all(|(url, _)| url == "good.mp4"));
    assert_ne!(*sink.frames()[40].get_pixel(0, 0), GREEN);
}

#[tokio::test]
async fn overlapping_export_is_rejected() {
    let project = Project::new("Busy");
    let plan = plan_for(&project, 1);
    let renderer = FrameRenderer::new(W, H, None);
    let lock = ExportLock::new();
    let held = lock.try_acquire().unwrap();

    let mut source = SolidSource::default();
    let mut sink = MemorySink::counting();
    let result = render_with(&lock, &project, &plan, &renderer, &mut source, &mut sink, None).await;
    assert!(matches!(result, Err(StoryreelError::ExportInProgress)));
    assert_eq!(sink.frame_count(), 0);

    drop(held);
    let report = render_with(&lock, &project, &plan, &renderer, &mut source, &mut sink, None)
        .await
        .unwrap();
    assert_eq!(report.total_frames, 5);
    assert!(!lock.is_busy());
}

#[tokio::test]
async fn sink_failure_aborts_and_releases_lock() {
    let mut project = Project::new("Fails");
    project
        .timeline
        .insert(placed("a", MediaType::Video, "a.mp4", 0.0, 5.0));
    let plan = plan_for(&project, 10);
    let renderer = FrameRenderer::new(W, H, None);
    let lock = ExportLock::new();
    let mut source = SolidSource::default();
    let mut sink = FailingSink {
        fail_after: 7,
        written: 0,
        aborted: false,
    };

    let stages: Arc<Mutex<Vec<ExportStage>>> = Arc::default();
    let seen = stages.clone();
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| {
        seen.lock().unwrap().push(p.stage);
    });

    let result = render_with(
        &lock,
        &project,
        &plan,
        &renderer,
        &mut source,
        &mut sink,
        Some(&progress),
    )
    .await;

    assert!(result.is_err());
    assert!(sink.aborted);
    assert_eq!(sink.written, 7);
    assert!(source.closed);
    assert!(!lock.is_busy());
    assert_eq!(stages.lock().unwrap().last(), Some(&ExportStage::Failed));
}

#[tokio::test]
async fn audio_only_project_reports_unmixed_audio_for_memory_sink() {
    let mut project = Project::new("Narration");
    project
        .timeline
        .insert(placed("v", MediaType::Audio, "voice.webm", 1.0, 7.0));
    project
        .timeline
        .add_overlay("Hello", 0.0, Some(2.0), OverlayPosition::Top, None);
    let plan = plan_for(&project, 5);
    let renderer = FrameRenderer::new(W, H, None);
    let mut source = SolidSource::default();
    let mut sink = MemorySink::counting();

    let report = render_with(
        &ExportLock::new(),
        &project,
        &plan,
        &renderer,
        &mut source,
        &mut sink,
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.total_frames, 35);
    assert!(!report.audio_muxed);
    assert!(source.preloaded.is_empty());
}

#[tokio::test]
async fn progress_ends_complete() {
    let project = Project::new("Progress");
    let plan = plan_for(&project, 2);
    let renderer = FrameRenderer::new(W, H, None);
    let mut source = SolidSource::default();
    let mut sink = MemorySink::counting();

    let seen: Arc<Mutex<Vec<ExportProgress>>> = Arc::default();
    let sink_seen = seen.clone();
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| sink_seen.lock().unwrap().push(p));

    render_with(
        &ExportLock::new(),
        &project,
        &plan,
        &renderer,
        &mut source,
        &mut sink,
        Some(&progress),
    )
    .await
    .unwrap();

    let seen = seen.lock().unwrap();
    let rendering: Vec<f64> = seen
        .iter()
        .filter(|p| p.stage == ExportStage::Rendering)
        .map(|p| p.progress)
        .collect();
    assert!(rendering.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(rendering.last().copied(), Some(1.0));
    assert_eq!(seen.last().map(|p| p.stage), Some(ExportStage::Complete));
}

proptest! {
    #[test]
    fn frame_count_is_floor_of_duration_times_fps(end in 0.1f64..40.0, fps in 1u32..60) {
        let mut project = Project::new("Any");
        project.timeline.insert(placed("a", MediaType::Video, "a.mp4", 0.0, end));
        let duration = export_duration(&project.timeline, MIN_EXPORT_SECS);
        prop_assert!(duration >= MIN_EXPORT_SECS);
        prop_assert!((duration - end.max(MIN_EXPORT_SECS)).abs() < 1e-9);
        prop_assert_eq!(total_frames(duration, fps), (duration * fps as f64).floor() as u64);
    }
}
