//! Timeline engine: per-track, time-addressed clip sets and their mutations.
//!
//! The timeline owns three independent tracks (video clips, audio clips,
//! text overlays) plus the list of generated scenes. Every mutation leaves
//! each clip track sorted by `start_time`. Placement, split, and arrange
//! never introduce an overlap; [`Timeline::trim`] is a manual override and
//! does not check neighbors (see [`Timeline::trim_checked`]).

use serde::{Deserialize, Serialize};

use crate::clip::{
    Clip, MediaType, OverlayPosition, Scene, TextOverlay, TrackKind, DEFAULT_OVERLAY_SECS,
    TIME_EPSILON,
};
use crate::project::ProjectError;
use crate::time::{format_hms, safe_duration, safe_seconds, UNKNOWN_DURATION_SECS};

/// Floor applied to the derived timeline duration.
pub const DEFAULT_TIMELINE_SECS: f64 = 30.0;

/// Minimum distance from a clip edge for a playhead split.
pub const PLAYHEAD_SPLIT_EPSILON_SECS: f64 = 0.1;

/// The editing aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    /// Video clips, sorted by start time.
    #[serde(default)]
    pub video_track: Vec<Clip>,

    /// Audio clips, sorted by start time.
    #[serde(default)]
    pub audio_track: Vec<Clip>,

    /// Text overlays in draw order.
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,

    /// Generated scenes, laid out sequentially by index.
    #[serde(default)]
    pub scenes: Vec<Scene>,

    /// Sequence used to derive fresh ids.
    #[serde(default)]
    next_seq: u64,
}

/// Partial update for a text overlay. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct OverlayUpdate {
    pub text: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub position: Option<OverlayPosition>,
    pub font_size: Option<f32>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clips of one track, sorted by start time.
    pub fn track(&self, kind: TrackKind) -> &[Clip] {
        match kind {
            TrackKind::Video => &self.video_track,
            TrackKind::Audio => &self.audio_track,
        }
    }

    fn track_mut(&mut self, kind: TrackKind) -> &mut Vec<Clip> {
        match kind {
            TrackKind::Video => &mut self.video_track,
            TrackKind::Audio => &mut self.audio_track,
        }
    }

    /// Whether every track (and the scene list) is empty.
    pub fn is_empty(&self) -> bool {
        self.video_track.is_empty()
            && self.audio_track.is_empty()
            && self.text_overlays.is_empty()
            && self.scenes.is_empty()
    }

    /// Look up a placed clip on either track.
    pub fn clip(&self, id: &str) -> Option<&Clip> {
        self.video_track
            .iter()
            .chain(self.audio_track.iter())
            .find(|c| c.id == id)
    }

    fn locate(&self, id: &str) -> Option<(TrackKind, usize)> {
        if let Some(idx) = self.video_track.iter().position(|c| c.id == id) {
            return Some((TrackKind::Video, idx));
        }
        self.audio_track
            .iter()
            .position(|c| c.id == id)
            .map(|idx| (TrackKind::Audio, idx))
    }

    fn id_in_use(&self, id: &str) -> bool {
        self.clip(id).is_some() || self.text_overlays.iter().any(|o| o.id == id)
    }

    /// Derive an id from `base` that no clip or overlay currently uses.
    fn fresh_id(&mut self, base: &str) -> String {
        loop {
            self.next_seq += 1;
            let candidate = format!("{base}-{}", self.next_seq);
            if !self.id_in_use(&candidate) {
                return candidate;
            }
        }
    }

    /// Last value handed out by the id sequence.
    pub fn id_sequence(&self) -> u64 {
        self.next_seq
    }

    /// Continue the id sequence after `seq`, or after the largest numeric id
    /// suffix still in use when that is higher. The sequence never moves back.
    pub fn resume_id_sequence(&mut self, seq: u64) {
        let in_use = self
            .video_track
            .iter()
            .chain(&self.audio_track)
            .map(|c| c.id.as_str())
            .chain(self.text_overlays.iter().map(|o| o.id.as_str()))
            .filter_map(|id| id.rsplit('-').next()?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.next_seq = self.next_seq.max(seq).max(in_use);
    }

    /// Use `preferred` unless it collides, otherwise derive a fresh id from it.
    fn unique_id(&mut self, preferred: String) -> String {
        if self.id_in_use(&preferred) {
            self.fresh_id(&preferred)
        } else {
            preferred
        }
    }

    fn sort_track(&mut self, kind: TrackKind) {
        self.track_mut(kind)
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }

    // ---------------------------------------------------------------------
    // Placement
    // ---------------------------------------------------------------------

    /// Earliest start on `kind` where a clip of `span` seconds fits.
    ///
    /// Walks the gaps from 0 between consecutive clips and returns the start
    /// of the first gap at least `span` long, or the end of the last clip.
    pub fn placement_for(&self, kind: TrackKind, span: f64) -> f64 {
        let span = safe_duration(span, UNKNOWN_DURATION_SECS);
        let mut sorted: Vec<&Clip> = self.track(kind).iter().collect();
        sorted.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let mut cursor = 0.0_f64;
        for clip in sorted {
            if clip.start_time - cursor + TIME_EPSILON >= span {
                return cursor;
            }
            cursor = cursor.max(clip.end_time);
        }
        cursor
    }

    /// Drop a library clip onto the track matching its media type.
    ///
    /// The placed copy gets a fresh `timeline-<source id>-<n>` id and keeps
    /// the source's visible span. Returns the new clip's id.
    pub fn place(&mut self, source: &Clip) -> String {
        let kind = TrackKind::from(source.media_type);
        let span = safe_duration(source.span(), UNKNOWN_DURATION_SECS);
        let start = self.placement_for(kind, span);

        let mut clip = source.clone();
        clip.id = self.fresh_id(&format!("timeline-{}", source.id));
        clip.place_at(start, span);
        let id = clip.id.clone();

        tracing::debug!(clip = %id, ?kind, start, span, "Placed clip");
        self.track_mut(kind).push(clip);
        self.sort_track(kind);
        id
    }

    /// Insert an already-positioned clip as-is (uploads and restores).
    ///
    /// Returns `false` and leaves the timeline untouched when the clip's
    /// interval is invalid.
    pub fn insert(&mut self, mut clip: Clip) -> bool {
        if !clip.has_valid_interval() {
            tracing::warn!(clip = %clip.id, "Rejected clip with invalid interval");
            return false;
        }
        clip.id = self.unique_id(clip.id);
        clip.refresh_display_duration();
        let kind = TrackKind::from(clip.media_type);
        self.track_mut(kind).push(clip);
        self.sort_track(kind);
        true
    }

    /// Add a voice recording to the audio track.
    ///
    /// With `start` the clip is a voiceover anchored at that time; otherwise it
    /// is a plain recording at 0. Voiceovers may layer over existing audio.
    pub fn add_voiceover(&mut self, start: Option<f64>, duration: f64, url: &str) -> String {
        let duration = safe_duration(duration, UNKNOWN_DURATION_SECS);
        let (base, label, start) = match start {
            Some(start) => ("voiceover", "Voiceover", safe_seconds(start)),
            None => ("recording", "Voice Recording", 0.0),
        };

        let id = self.fresh_id(base);
        let mut clip = Clip::new(
            id.clone(),
            format!("{label} {}", format_hms(duration)),
            MediaType::Audio,
            url,
            duration,
        );
        clip.place_at(start, duration);

        self.audio_track.push(clip);
        self.sort_track(TrackKind::Audio);
        id
    }

    // ---------------------------------------------------------------------
    // Split / trim / delete / arrange
    // ---------------------------------------------------------------------

    /// Cut a clip at `offset` seconds from its own start.
    ///
    /// No-op unless `0 < offset < span`. On success the clip is replaced in
    /// place by two halves and their ids are returned.
    pub fn split(&mut self, clip_id: &str, offset: f64) -> Option<(String, String)> {
        let (kind, idx) = self.locate(clip_id)?;
        let original = self.track(kind)[idx].clone();

        if !offset.is_finite() || offset <= 0.0 || offset >= original.span() {
            tracing::debug!(clip = %clip_id, offset, "Split offset outside clip, ignoring");
            return None;
        }

        let cut = original.start_time + offset;

        let mut first = original.clone();
        first.id = self.unique_id(format!("{}-part1", original.id));
        first.name = format!("{} (Part 1)", original.name);
        first.end_time = cut;
        first.refresh_display_duration();

        let mut second = original.clone();
        second.id = self.unique_id(format!("{}-part2", original.id));
        second.name = format!("{} (Part 2)", original.name);
        second.start_time = cut;
        second.refresh_display_duration();

        let ids = (first.id.clone(), second.id.clone());
        let track = self.track_mut(kind);
        track[idx] = second;
        track.insert(idx, first);

        tracing::debug!(clip = %clip_id, cut, "Split clip");
        Some(ids)
    }

    /// Split the video clip under `time`, if the cut is at least `epsilon`
    /// away from both of its edges.
    pub fn split_at_playhead(&mut self, time: f64, epsilon: f64) -> Option<(String, String)> {
        let clip = self.active_video_at(time)?;
        let offset = time - clip.start_time;
        if offset <= epsilon || offset >= clip.span() - epsilon {
            return None;
        }
        let id = clip.id.clone();
        self.split(&id, offset)
    }

    /// Reassign a clip's interval without checking its neighbors.
    ///
    /// Returns `false` when the clip does not exist or the new interval is
    /// not `0 <= start < end`.
    pub fn trim(&mut self, clip_id: &str, start: f64, end: f64) -> bool {
        let Some((kind, idx)) = self.locate(clip_id) else {
            return false;
        };
        if !start.is_finite() || !end.is_finite() || start < 0.0 || start >= end {
            tracing::warn!(clip = %clip_id, start, end, "Ignoring trim to invalid interval");
            return false;
        }

        let clip = &mut self.track_mut(kind)[idx];
        clip.start_time = start;
        clip.end_time = end;
        clip.refresh_display_duration();
        self.sort_track(kind);
        true
    }

    /// Like [`Timeline::trim`], but rejects intervals that would overlap
    /// another clip on the same track.
    pub fn trim_checked(&mut self, clip_id: &str, start: f64, end: f64) -> Result<(), ProjectError> {
        let (kind, idx) = self
            .locate(clip_id)
            .ok_or_else(|| ProjectError::validation(format!("no clip with id {clip_id}")))?;

        let mut probe = self.track(kind)[idx].clone();
        probe.start_time = start;
        probe.end_time = end;
        if !probe.has_valid_interval() {
            return Err(ProjectError::validation(format!(
                "invalid interval [{start}, {end}) for clip {clip_id}"
            )));
        }
        if let Some(other) = self
            .track(kind)
            .iter()
            .find(|c| c.id != clip_id && c.overlaps(&probe))
        {
            return Err(ProjectError::validation(format!(
                "clip {clip_id} would overlap {}",
                other.id
            )));
        }

        self.trim(clip_id, start, end);
        Ok(())
    }

    /// Remove a clip from whichever track holds it. Neighbors do not move.
    pub fn delete(&mut self, clip_id: &str) -> Option<Clip> {
        let (kind, idx) = self.locate(clip_id)?;
        Some(self.track_mut(kind).remove(idx))
    }

    /// Pack a track contiguously from 0, preserving order and spans.
    pub fn arrange(&mut self, kind: TrackKind) {
        self.sort_track(kind);
        let mut cursor = 0.0;
        for clip in self.track_mut(kind).iter_mut() {
            let span = clip.span();
            clip.place_at(cursor, span);
            cursor += span;
        }
    }

    // ---------------------------------------------------------------------
    // Overlays and scenes
    // ---------------------------------------------------------------------

    /// Add a text overlay; returns its id.
    pub fn add_overlay(
        &mut self,
        text: impl Into<String>,
        start: f64,
        duration: Option<f64>,
        position: OverlayPosition,
        font_size: Option<f32>,
    ) -> String {
        let id = self.fresh_id("overlay");
        let mut overlay = TextOverlay::new(
            id.clone(),
            text,
            start,
            duration.unwrap_or(DEFAULT_OVERLAY_SECS),
        )
        .with_position(position);
        if let Some(size) = font_size {
            overlay = overlay.with_font_size(size);
        }
        self.text_overlays.push(overlay);
        id
    }

    /// Apply a partial update. Returns `false` if the id is unknown or the
    /// resulting interval would be empty.
    pub fn update_overlay(&mut self, id: &str, update: OverlayUpdate) -> bool {
        let Some(overlay) = self.text_overlays.iter_mut().find(|o| o.id == id) else {
            return false;
        };

        let start = update.start_time.map(safe_seconds).unwrap_or(overlay.start_time);
        let end = update.end_time.unwrap_or(overlay.end_time);
        if !end.is_finite() || end <= start {
            tracing::warn!(overlay = %id, start, end, "Ignoring overlay update with empty interval");
            return false;
        }

        overlay.start_time = start;
        overlay.end_time = end;
        if let Some(text) = update.text {
            overlay.text = text;
        }
        if let Some(position) = update.position {
            overlay.position = position;
        }
        if let Some(size) = update.font_size.filter(|s| s.is_finite() && *s > 0.0) {
            overlay.font_size = size;
        }
        true
    }

    pub fn remove_overlay(&mut self, id: &str) -> Option<TextOverlay> {
        let idx = self.text_overlays.iter().position(|o| o.id == id)?;
        Some(self.text_overlays.remove(idx))
    }

    pub fn add_scene(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    /// Rename or re-time a scene. Returns `false` for an unknown id.
    pub fn update_scene(&mut self, id: &str, name: Option<String>, duration_ms: Option<f64>) -> bool {
        let Some(scene) = self.scenes.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        if let Some(name) = name {
            scene.name = name;
        }
        if let Some(ms) = duration_ms {
            scene.duration_ms = safe_seconds(ms);
        }
        true
    }

    pub fn remove_scene(&mut self, id: &str) -> Option<Scene> {
        let idx = self.scenes.iter().position(|s| s.id == id)?;
        Some(self.scenes.remove(idx))
    }

    /// Sum of scene durations in seconds.
    pub fn scenes_duration(&self) -> f64 {
        self.scenes.iter().map(Scene::duration_secs).sum()
    }

    // ---------------------------------------------------------------------
    // Derived durations
    // ---------------------------------------------------------------------

    fn track_end(track: &[Clip]) -> f64 {
        track
            .iter()
            .map(|c| safe_seconds(c.end_time))
            .fold(0.0, f64::max)
    }

    /// Derived editing duration: the longest of either clip track, the
    /// scene sum, and `floor`. Always finite and positive.
    pub fn total_duration(&self, floor: f64) -> f64 {
        let floor = safe_duration(floor, DEFAULT_TIMELINE_SECS);
        let total = Self::track_end(&self.video_track)
            .max(Self::track_end(&self.audio_track))
            .max(safe_seconds(self.scenes_duration()))
            .max(floor);
        safe_duration(total, DEFAULT_TIMELINE_SECS)
    }

    /// End of placed content: the latest end across video, audio, and
    /// overlays. Zero for an empty timeline.
    pub fn content_end(&self) -> f64 {
        let overlays = self
            .text_overlays
            .iter()
            .map(|o| safe_seconds(o.end_time))
            .fold(0.0, f64::max);
        Self::track_end(&self.video_track)
            .max(Self::track_end(&self.audio_track))
            .max(overlays)
    }

    /// Whether any clip or overlay is placed.
    pub fn has_content(&self) -> bool {
        !self.video_track.is_empty() || !self.audio_track.is_empty() || !self.text_overlays.is_empty()
    }

    // ---------------------------------------------------------------------
    // Active-clip resolution
    // ---------------------------------------------------------------------

    /// The video clip whose interval contains `time`.
    pub fn active_video_at(&self, time: f64) -> Option<&Clip> {
        self.video_track.iter().find(|c| c.contains(time))
    }

    /// Every audio clip whose interval contains `time`.
    pub fn active_audio_at(&self, time: f64) -> Vec<&Clip> {
        self.audio_track.iter().filter(|c| c.contains(time)).collect()
    }

    /// Every overlay active at `time`, in draw order.
    pub fn active_overlays_at(&self, time: f64) -> Vec<&TextOverlay> {
        self.text_overlays
            .iter()
            .filter(|o| o.is_active_at(time))
            .collect()
    }

    /// First video clip starting strictly after `time`.
    pub fn next_video_after(&self, time: f64) -> Option<&Clip> {
        self.video_track
            .iter()
            .filter(|c| c.start_time > time)
            .min_by(|a, b| a.start_time.total_cmp(&b.start_time))
    }

    /// Human-readable descriptions of same-track overlaps.
    pub fn overlap_report(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for kind in [TrackKind::Video, TrackKind::Audio] {
            let track = self.track(kind);
            for (i, a) in track.iter().enumerate() {
                for b in &track[i + 1..] {
                    if a.overlaps(b) {
                        problems.push(format!("{kind:?} clips {} and {} overlap", a.id, b.id));
                    }
                }
            }
        }
        problems
    }
}
