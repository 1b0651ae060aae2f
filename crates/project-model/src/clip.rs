//! Clip, overlay, and scene entities.
//!
//! All times are timeline-absolute seconds. A clip's *visible span* is
//! `end_time - start_time`, which may differ from the intrinsic length of the
//! underlying asset after a split or trim.

use serde::{Deserialize, Serialize};

use crate::time::{format_hms, ms_to_secs, safe_duration, safe_seconds, UNKNOWN_DURATION_SECS};

/// Tolerance used when comparing timeline seconds.
pub const TIME_EPSILON: f64 = 1e-9;

/// Kind of media a clip carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

/// The two clip-bearing tracks of a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl From<MediaType> for TrackKind {
    fn from(media: MediaType) -> Self {
        match media {
            MediaType::Video => TrackKind::Video,
            MediaType::Audio => TrackKind::Audio,
        }
    }
}

/// A placed (or library) unit of video or audio media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    /// Unique identifier. Never reused across operations.
    pub id: String,

    /// Display label.
    pub name: String,

    pub media_type: MediaType,

    /// Locator for the underlying media.
    pub source_url: String,

    /// Intrinsic length of the underlying asset (seconds). Zero when unknown.
    #[serde(default)]
    pub source_duration_secs: f64,

    /// Timeline-absolute placement start (seconds).
    pub start_time: f64,

    /// Timeline-absolute placement end (seconds).
    pub end_time: f64,

    /// `HH:MM:SS` rendering of the visible span.
    #[serde(default)]
    pub display_duration: String,

    /// Optional thumbnail locator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Clip {
    /// Create an unplaced clip spanning `[0, duration)`.
    ///
    /// Invalid durations fall back to [`UNKNOWN_DURATION_SECS`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        media_type: MediaType,
        source_url: impl Into<String>,
        duration_secs: f64,
    ) -> Self {
        let duration = safe_duration(duration_secs, UNKNOWN_DURATION_SECS);
        Self {
            id: id.into(),
            name: name.into(),
            media_type,
            source_url: source_url.into(),
            source_duration_secs: duration,
            start_time: 0.0,
            end_time: duration,
            display_duration: format_hms(duration),
            thumbnail: None,
        }
    }

    /// Attach a thumbnail locator.
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Visible span in seconds.
    pub fn span(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Whether `time` lies inside `[start_time, end_time)`.
    pub fn contains(&self, time: f64) -> bool {
        self.start_time <= time && time < self.end_time
    }

    /// Whether the half-open intervals of two clips intersect.
    pub fn overlaps(&self, other: &Clip) -> bool {
        self.start_time < other.end_time - TIME_EPSILON
            && other.start_time < self.end_time - TIME_EPSILON
    }

    /// Whether the interval satisfies `0 <= start < end` with finite values.
    pub fn has_valid_interval(&self) -> bool {
        self.start_time.is_finite()
            && self.end_time.is_finite()
            && self.start_time >= 0.0
            && self.start_time < self.end_time
    }

    /// Map a timeline time onto the clip's media-local time.
    pub fn local_time(&self, timeline_time: f64) -> f64 {
        safe_seconds(timeline_time - self.start_time)
    }

    /// Move the clip so that it occupies `[start, start + span)`.
    pub(crate) fn place_at(&mut self, start: f64, span: f64) {
        self.start_time = start;
        self.end_time = start + span;
        self.refresh_display_duration();
    }

    pub(crate) fn refresh_display_duration(&mut self) {
        self.display_duration = format_hms(self.span());
    }
}

/// Vertical anchor of a text overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

impl OverlayPosition {
    /// Vertical anchor as a fraction of frame height.
    pub fn anchor_ratio(self) -> f64 {
        match self {
            OverlayPosition::Top => 0.15,
            OverlayPosition::Center => 0.50,
            OverlayPosition::Bottom => 0.85,
        }
    }
}

/// A text caption shown over the composited video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    pub id: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub position: OverlayPosition,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

/// Default overlay font size in output pixels.
pub const DEFAULT_FONT_SIZE: f32 = 32.0;

/// Default overlay duration when none is given.
pub const DEFAULT_OVERLAY_SECS: f64 = 5.0;

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}

impl TextOverlay {
    /// Create an overlay starting at `start` for `duration` seconds.
    pub fn new(id: impl Into<String>, text: impl Into<String>, start: f64, duration: f64) -> Self {
        let start = safe_seconds(start);
        Self {
            id: id.into(),
            text: text.into(),
            start_time: start,
            end_time: start + safe_duration(duration, DEFAULT_OVERLAY_SECS),
            position: OverlayPosition::default(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }

    pub fn with_position(mut self, position: OverlayPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        if font_size.is_finite() && font_size > 0.0 {
            self.font_size = font_size;
        }
        self
    }

    /// Whether `time` lies inside `[start_time, end_time)`.
    pub fn is_active_at(&self, time: f64) -> bool {
        self.start_time <= time && time < self.end_time
    }
}

/// Opaque animation unit produced by the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Scene {
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration_ms: safe_seconds(duration_ms),
            description: None,
        }
    }

    /// Scene length in timeline seconds.
    pub fn duration_secs(&self) -> f64 {
        ms_to_secs(self.duration_ms)
    }
}
