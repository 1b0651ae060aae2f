//! Frame compositor: decides what each exported frame shows.
//!
//! Composition is planned separately from rasterization so the layer
//! decisions (active clip, letterbox rectangle, overlay anchors, placeholder
//! card) can be checked without decoding any media.

use storyreel_common::FrameRate;
use storyreel_project_model::{seconds_to_timecode, OverlayPosition, Timeline};

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Largest rectangle with the source aspect ratio that fits the canvas,
/// centered. Never crops, never stretches.
pub fn fit_rect(src_width: u32, src_height: u32, canvas_width: u32, canvas_height: u32) -> Rect {
    if src_width == 0 || src_height == 0 || canvas_width == 0 || canvas_height == 0 {
        return Rect {
            x: 0,
            y: 0,
            width: canvas_width,
            height: canvas_height,
        };
    }

    let scale = f64::min(
        canvas_width as f64 / src_width as f64,
        canvas_height as f64 / src_height as f64,
    );
    let width = ((src_width as f64 * scale).round() as u32).clamp(1, canvas_width);
    let height = ((src_height as f64 * scale).round() as u32).clamp(1, canvas_height);

    Rect {
        x: ((canvas_width - width) / 2) as i32,
        y: ((canvas_height - height) / 2) as i32,
        width,
        height,
    }
}

/// Vertical pixel anchor of an overlay's text center.
pub fn overlay_anchor_y(position: OverlayPosition, canvas_height: u32) -> i32 {
    (position.anchor_ratio() * canvas_height as f64).round() as i32
}

/// The video layer of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoLayer {
    pub clip_id: String,
    pub source_url: String,
    /// Seek target inside the source.
    pub local_time: f64,
}

/// A text overlay to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayer {
    pub text: String,
    pub font_size: f32,
    pub position: OverlayPosition,
}

/// Card drawn when no video clip covers the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderCard {
    pub title: String,
    /// `elapsed / total` line.
    pub clock: String,
}

impl PlaceholderCard {
    pub fn new(title: &str, time_secs: f64, duration_secs: f64) -> Self {
        let title = if title.trim().is_empty() {
            "Untitled".to_string()
        } else {
            title.trim().to_string()
        };
        Self {
            title,
            clock: format!(
                "{} / {}",
                seconds_to_timecode(time_secs),
                seconds_to_timecode(duration_secs)
            ),
        }
    }
}

/// Composition instructions for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameComposition {
    pub frame_index: u64,
    pub time_secs: f64,
    pub video: Option<VideoLayer>,
    /// Shown when `video` is `None`, or when the video layer fails to decode.
    pub placeholder: PlaceholderCard,
    pub overlays: Vec<OverlayLayer>,
}

/// Plan frame `frame_index` of an export at `fps`.
pub fn compose_frame(
    title: &str,
    timeline: &Timeline,
    frame_index: u64,
    fps: u32,
    duration_secs: f64,
) -> FrameComposition {
    let time_secs = FrameRate::new(fps).frame_time(frame_index);

    let video = timeline.active_video_at(time_secs).map(|clip| VideoLayer {
        clip_id: clip.id.clone(),
        source_url: clip.source_url.clone(),
        local_time: clip.local_time(time_secs),
    });

    let overlays = timeline
        .active_overlays_at(time_secs)
        .into_iter()
        .map(|overlay| OverlayLayer {
            text: overlay.text.clone(),
            font_size: overlay.font_size,
            position: overlay.position,
        })
        .collect();

    FrameComposition {
        frame_index,
        time_secs,
        video,
        placeholder: PlaceholderCard::new(title, time_secs, duration_secs),
        overlays,
    }
}
