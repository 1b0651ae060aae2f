//! Media-element binding.
//!
//! After every cursor change the synchronizer points the preview's video
//! element at the active clip's source (reloading only when the source
//! actually differs), seeks it to the clip-local offset, and plays or pauses
//! it to match the transport. Audio clips each get their own element keyed
//! by clip id, bound the same way.

use std::collections::{BTreeMap, HashMap};

use storyreel_common::PlaybackConfig;
use storyreel_project_model::{Clip, MediaType, Timeline};

use crate::media::{MediaBackend, MediaElement, ReadyState};
use crate::preload::{PreloadPool, PreloadProgress};
use crate::transport::{TransportState, VideoPosition};

/// Per-clip load state shown in the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipStatus {
    Loading,
    Ready,
    Unavailable { reason: String },
}

fn element_status(element: &dyn MediaElement) -> ClipStatus {
    match element.load_error() {
        Some(err) => ClipStatus::Unavailable {
            reason: err.to_string(),
        },
        None if element.ready_state() >= ReadyState::CurrentData => ClipStatus::Ready,
        None => ClipStatus::Loading,
    }
}

/// Keeps preview media elements in step with the transport.
pub struct MediaSync {
    video: Box<dyn MediaElement>,
    bound_clip: Option<String>,
    audio: HashMap<String, Box<dyn MediaElement>>,
    preload: PreloadPool,
    preload_enabled: bool,
    seek_tolerance: f64,
    statuses: BTreeMap<String, ClipStatus>,
}

impl MediaSync {
    pub fn new(backend: &mut dyn MediaBackend, config: &PlaybackConfig) -> Self {
        Self {
            video: backend.create_element(MediaType::Video),
            bound_clip: None,
            audio: HashMap::new(),
            preload: PreloadPool::new(),
            preload_enabled: config.preload,
            seek_tolerance: config.seek_tolerance_secs.max(0.0),
            statuses: BTreeMap::new(),
        }
    }

    /// Id of the clip the video element is bound to.
    pub fn bound_clip(&self) -> Option<&str> {
        self.bound_clip.as_deref()
    }

    /// Source currently loaded in the video element.
    pub fn video_source(&self) -> Option<String> {
        self.video.source()
    }

    /// Last observed status of a clip, if it has been bound.
    pub fn status(&self, clip_id: &str) -> Option<&ClipStatus> {
        self.statuses.get(clip_id)
    }

    pub fn statuses(&self) -> &BTreeMap<String, ClipStatus> {
        &self.statuses
    }

    pub fn preload_progress(&self) -> Vec<PreloadProgress> {
        self.preload.progress()
    }

    /// Number of live audio elements.
    pub fn audio_elements(&self) -> usize {
        self.audio.len()
    }

    /// Where the video element says the active clip is.
    pub fn video_position(&self, timeline: &Timeline, time: f64) -> VideoPosition {
        let Some(clip) = timeline.active_video_at(time) else {
            return VideoPosition::Detached;
        };
        if self.bound_clip.as_deref() != Some(clip.id.as_str())
            || self.video.load_error().is_some()
        {
            return VideoPosition::Detached;
        }
        if self.video.has_ended() {
            VideoPosition::Ended
        } else {
            VideoPosition::Local(self.video.current_time())
        }
    }

    /// Refresh preloads for every video source on the timeline.
    pub fn refresh_preloads(&mut self, timeline: &Timeline, backend: &mut dyn MediaBackend) {
        if !self.preload_enabled {
            return;
        }
        let bound = self.video.source();
        self.preload.refresh(
            timeline.video_track.iter().map(|c| c.source_url.as_str()),
            bound.as_deref(),
            backend,
        );
    }

    /// Apply the binding discipline for the transport state.
    pub fn sync(&mut self, timeline: &Timeline, state: TransportState, backend: &mut dyn MediaBackend) {
        self.sync_video(timeline, state);
        self.sync_audio(timeline, state, backend);
    }

    fn sync_video(&mut self, timeline: &Timeline, state: TransportState) {
        let Some(clip) = timeline.active_video_at(state.current_time) else {
            if !self.video.is_paused() {
                self.video.pause();
            }
            self.bound_clip = None;
            return;
        };

        if self.video.source().as_deref() != Some(clip.source_url.as_str()) {
            self.bind_video_source(clip);
        }
        if self.bound_clip.as_deref() != Some(clip.id.as_str()) {
            tracing::debug!(clip = %clip.id, url = %clip.source_url, "Bound video clip");
            self.bound_clip = Some(clip.id.clone());
        }

        let local = (state.current_time - clip.start_time).max(0.0);
        let status = drive_element(
            self.video.as_mut(),
            local,
            state.is_playing,
            self.seek_tolerance,
            &clip.id,
        );
        self.statuses.insert(clip.id.clone(), status);
    }

    fn bind_video_source(&mut self, clip: &Clip) {
        match self.preload.take_ready(&clip.source_url) {
            Some(preloaded) => {
                let previous = std::mem::replace(&mut self.video, preloaded);
                tracing::debug!(url = %clip.source_url, "Swapped in preloaded element");
                if self.preload_enabled {
                    self.preload.put_back(previous);
                } else {
                    let mut previous = previous;
                    previous.clear_source();
                }
            }
            None => {
                self.video.set_source(&clip.source_url);
            }
        }
    }

    fn sync_audio(&mut self, timeline: &Timeline, state: TransportState, backend: &mut dyn MediaBackend) {
        self.audio.retain(|id, element| {
            let keep = timeline.audio_track.iter().any(|c| &c.id == id);
            if !keep {
                element.clear_source();
            }
            keep
        });

        for clip in &timeline.audio_track {
            if !clip.contains(state.current_time) {
                if let Some(element) = self.audio.get_mut(&clip.id) {
                    if !element.is_paused() {
                        element.pause();
                    }
                }
                continue;
            }

            let element = self.audio.entry(clip.id.clone()).or_insert_with(|| {
                tracing::debug!(clip = %clip.id, "Created audio element");
                backend.create_element(MediaType::Audio)
            });
            if element.source().as_deref() != Some(clip.source_url.as_str()) {
                element.set_source(&clip.source_url);
            }
            let local = state.current_time - clip.start_time;
            let status = drive_element(
                element.as_mut(),
                local,
                state.is_playing,
                self.seek_tolerance,
                &clip.id,
            );
            self.statuses.insert(clip.id.clone(), status);
        }
    }

    /// Pause everything without unbinding.
    pub fn pause_all(&mut self) {
        self.video.pause();
        for element in self.audio.values_mut() {
            element.pause();
        }
    }

    /// Pause and release every element, including preloads.
    pub fn release(&mut self) {
        self.video.clear_source();
        self.bound_clip = None;
        for element in self.audio.values_mut() {
            element.clear_source();
        }
        self.audio.clear();
        self.preload.release_all();
    }
}

/// Seek (beyond tolerance) and play/pause one element; report its status.
fn drive_element(
    element: &mut dyn MediaElement,
    local: f64,
    playing: bool,
    tolerance: f64,
    clip_id: &str,
) -> ClipStatus {
    if (element.current_time() - local).abs() > tolerance {
        element.seek(local);
    }

    if playing {
        if element.is_paused() && !element.has_ended() {
            if let Err(e) = element.play() {
                tracing::warn!(clip = %clip_id, error = %e, "Media element refused to play");
                return ClipStatus::Unavailable {
                    reason: e.to_string(),
                };
            }
        }
    } else if !element.is_paused() {
        element.pause();
    }

    element_status(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedBackend, SimulatedSource};
    use storyreel_project_model::Clip;

    fn placed(id: &str, url: &str, start: f64, end: f64) -> Clip {
        let mut c = Clip::new(id, id, MediaType::Video, url, end - start);
        c.start_time = start;
        c.end_time = end;
        c
    }

    fn setup() -> (SimulatedBackend, Timeline) {
        let backend = SimulatedBackend::default()
            .with_source("a.mp4", SimulatedSource::new(10.0))
            .with_source("b.mp4", SimulatedSource::new(10.0))
            .with_source("broken.mp4", SimulatedSource::new(10.0).failing("404"))
            .with_source("vo.wav", SimulatedSource::new(5.0));
        let mut timeline = Timeline::new();
        timeline.insert(placed("a", "a.mp4", 0.0, 4.0));
        timeline.insert(placed("b", "b.mp4", 4.0, 8.0));
        timeline.insert(placed("x", "broken.mp4", 10.0, 12.0));
        (backend, timeline)
    }

    fn state(t: f64, playing: bool) -> TransportState {
        TransportState {
            current_time: t,
            is_playing: playing,
        }
    }

    #[test]
    fn test_binds_and_seeks_active_clip() {
        let (mut backend, timeline) = setup();
        let mut sync = MediaSync::new(&mut backend, &PlaybackConfig::default());

        sync.sync(&timeline, state(5.5, false), &mut backend);
        assert_eq!(sync.bound_clip(), Some("b"));
        assert_eq!(sync.video_source().as_deref(), Some("b.mp4"));
        assert_eq!(
            sync.video_position(&timeline, 5.5),
            VideoPosition::Local(1.5)
        );
        assert_eq!(sync.status("b"), Some(&ClipStatus::Ready));
    }

    #[test]
    fn test_small_drift_is_not_reseeked() {
        let (mut backend, timeline) = setup();
        let mut sync = MediaSync::new(&mut backend, &PlaybackConfig::default());
        sync.sync(&timeline, state(1.0, true), &mut backend);
        backend.pump(0.5);
        // Element is at 1.5; cursor says 1.45, inside the tolerance.
        sync.sync(&timeline, state(1.45, true), &mut backend);
        assert_eq!(sync.video_position(&timeline, 1.45), VideoPosition::Local(1.5));
        // A real seek far away moves the element.
        sync.sync(&timeline, state(3.0, true), &mut backend);
        assert_eq!(sync.video_position(&timeline, 3.0), VideoPosition::Local(3.0));
    }

    #[test]
    fn test_same_source_is_not_reloaded() {
        let (mut backend, mut timeline) = setup();
        timeline.split("a", 2.0);
        let mut sync = MediaSync::new(&mut backend, &PlaybackConfig::default());
        sync.sync(&timeline, state(1.0, true), &mut backend);
        backend.pump(0.5);
        sync.sync(&timeline, state(2.5, true), &mut backend);
        assert_eq!(sync.bound_clip(), Some("a-part2"));
        // Position follows the new clip's own start.
        assert_eq!(sync.video_position(&timeline, 2.5), VideoPosition::Local(0.5));
        assert!(matches!(sync.status("a-part2"), Some(ClipStatus::Ready)));
    }

    #[test]
    fn test_preloaded_element_is_swapped_in() {
        let (mut backend, timeline) = setup();
        let mut sync = MediaSync::new(&mut backend, &PlaybackConfig::default());
        sync.sync(&timeline, state(0.0, false), &mut backend);
        sync.refresh_preloads(&timeline, &mut backend);
        let urls: Vec<String> = sync.preload_progress().into_iter().map(|p| p.url).collect();
        assert_eq!(urls, ["b.mp4", "broken.mp4"]);

        sync.sync(&timeline, state(4.0, false), &mut backend);
        let urls: Vec<String> = sync.preload_progress().into_iter().map(|p| p.url).collect();
        assert_eq!(urls, ["a.mp4", "broken.mp4"]);
    }

    #[test]
    fn test_failed_source_is_unavailable() {
        let (mut backend, timeline) = setup();
        let mut sync = MediaSync::new(&mut backend, &PlaybackConfig::default());
        sync.sync(&timeline, state(11.0, true), &mut backend);
        assert!(matches!(sync.status("x"), Some(ClipStatus::Unavailable { .. })));
        assert_eq!(sync.video_position(&timeline, 11.0), VideoPosition::Detached);
    }

    #[test]
    fn test_audio_elements_follow_clips() {
        let (mut backend, mut timeline) = setup();
        let vo = timeline.add_voiceover(Some(1.0), 3.0, "vo.wav");
        let mut sync = MediaSync::new(&mut backend, &PlaybackConfig::default());

        sync.sync(&timeline, state(0.5, true), &mut backend);
        assert_eq!(sync.audio_elements(), 0);

        sync.sync(&timeline, state(2.0, true), &mut backend);
        assert_eq!(sync.audio_elements(), 1);
        assert_eq!(sync.status(&vo), Some(&ClipStatus::Ready));

        timeline.delete(&vo);
        sync.sync(&timeline, state(2.0, true), &mut backend);
        assert_eq!(sync.audio_elements(), 0);
    }

    #[test]
    fn test_gap_pauses_video() {
        let (mut backend, timeline) = setup();
        let mut sync = MediaSync::new(&mut backend, &PlaybackConfig::default());
        sync.sync(&timeline, state(1.0, true), &mut backend);
        sync.sync(&timeline, state(9.0, true), &mut backend);
        assert_eq!(sync.bound_clip(), None);
        assert_eq!(sync.video_position(&timeline, 9.0), VideoPosition::Detached);
    }
}
