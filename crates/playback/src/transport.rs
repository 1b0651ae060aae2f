//! Transport: the logical playback cursor and its per-tick advance.
//!
//! The cursor follows the media element bound to the active video clip:
//! inside a clip it publishes the element's position mapped back onto the
//! timeline, at a clip's end it cuts to the next clip or stops, and in a gap
//! it jumps forward to the next clip. Playback stops at the end of content;
//! it never loops.

use storyreel_common::PlaybackConfig;
use storyreel_project_model::Timeline;

/// Cursor step used when the timeline holds no content at all.
pub const EMPTY_TIMELINE_STEP_SECS: f64 = 1.0 / 60.0;

/// Playback cursor and play/pause state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransportState {
    pub current_time: f64,
    pub is_playing: bool,
}

/// Position report from the element bound to the active video clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoPosition {
    /// Local media time of the bound element.
    Local(f64),
    /// The element played to the end of its source.
    Ended,
    /// No usable element (not bound yet, or the source failed); the cursor
    /// falls back to host time.
    Detached,
}

/// Why autonomous playback stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cursor reached the end of placed content.
    EndOfContent,
    /// An empty timeline ran to its safety ceiling.
    EmptyTimelineLimit,
    /// The host asked playback to stop.
    Requested,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing; nothing changed.
    Idle,
    /// The cursor moved continuously.
    Advanced { time: f64 },
    /// The cursor cut over a gap or onto the next clip.
    Jumped { from: f64, to: f64 },
    /// Playback stopped with the cursor at `time`.
    Stopped { time: f64, reason: StopReason },
}

/// The transport state machine over `{paused, playing}`.
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    empty_limit_secs: f64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(&PlaybackConfig::default())
    }
}

impl Transport {
    pub fn new(config: &PlaybackConfig) -> Self {
        let empty_limit_secs = if config.empty_timeline_limit_secs.is_finite()
            && config.empty_timeline_limit_secs > 0.0
        {
            config.empty_timeline_limit_secs
        } else {
            30.0
        };
        Self {
            state: TransportState::default(),
            empty_limit_secs,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.state.current_time
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    /// Upper bound of the cursor: the content end, or the empty-timeline
    /// ceiling when nothing is placed.
    pub fn resolved_end(&self, timeline: &Timeline) -> f64 {
        let end = timeline.content_end();
        if end > 0.0 {
            end
        } else {
            self.empty_limit_secs
        }
    }

    /// Start playing. A cursor parked at the end rewinds to 0 first.
    pub fn play(&mut self, timeline: &Timeline) {
        if self.state.current_time >= self.resolved_end(timeline) {
            self.state.current_time = 0.0;
        }
        self.state.is_playing = true;
        tracing::debug!(time = self.state.current_time, "Playback started");
    }

    pub fn pause(&mut self) {
        if self.state.is_playing {
            tracing::debug!(time = self.state.current_time, "Playback paused");
        }
        self.state.is_playing = false;
    }

    /// Move the cursor without changing play state. Clamped to
    /// `[0, resolved end]`; non-finite input is ignored.
    pub fn seek(&mut self, time: f64, timeline: &Timeline) {
        if !time.is_finite() {
            tracing::warn!(time, "Ignoring seek to non-finite time");
            return;
        }
        self.state.current_time = time.clamp(0.0, self.resolved_end(timeline));
    }

    fn stop_at(&mut self, time: f64, reason: StopReason) -> TickOutcome {
        self.state.current_time = time;
        self.state.is_playing = false;
        tracing::info!(time, ?reason, "Playback stopped");
        TickOutcome::Stopped { time, reason }
    }

    fn jump_to(&mut self, to: f64) -> TickOutcome {
        let from = self.state.current_time;
        self.state.current_time = to;
        TickOutcome::Jumped { from, to }
    }

    /// Advance the cursor by one tick.
    ///
    /// `video` reports the element bound to the clip under the cursor; `dt`
    /// is the host time since the previous tick, used when no element drives
    /// the clock.
    pub fn tick(&mut self, timeline: &Timeline, video: VideoPosition, dt: f64) -> TickOutcome {
        if !self.state.is_playing {
            return TickOutcome::Idle;
        }
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let now = self.state.current_time;
        let content_end = timeline.content_end();

        if let Some(clip) = timeline.active_video_at(now) {
            let mapped = match video {
                VideoPosition::Local(local) if local.is_finite() => clip.start_time + local.max(0.0),
                VideoPosition::Local(_) | VideoPosition::Detached => now + dt,
                VideoPosition::Ended => clip.end_time,
            };
            if mapped < clip.end_time {
                self.state.current_time = mapped.max(now);
                return TickOutcome::Advanced {
                    time: self.state.current_time,
                };
            }

            // Cut to the next clip: adjacent clips hand over directly, later
            // ones skip the gap.
            if let Some(next) = timeline
                .video_track
                .iter()
                .filter(|c| c.start_time >= clip.end_time && c.id != clip.id)
                .min_by(|a, b| a.start_time.total_cmp(&b.start_time))
            {
                return self.jump_to(next.start_time);
            }
            if content_end > clip.end_time {
                // Audio or overlays continue past the last video clip.
                return self.jump_to(clip.end_time);
            }
            return self.stop_at(clip.end_time, StopReason::EndOfContent);
        }

        if content_end <= 0.0 {
            let next = now + EMPTY_TIMELINE_STEP_SECS;
            if next >= self.empty_limit_secs {
                return self.stop_at(self.empty_limit_secs, StopReason::EmptyTimelineLimit);
            }
            self.state.current_time = next;
            return TickOutcome::Advanced { time: next };
        }

        if now >= content_end {
            return self.stop_at(content_end, StopReason::EndOfContent);
        }

        if let Some(next) = timeline.next_video_after(now) {
            return self.jump_to(next.start_time);
        }

        // Past the last video clip with audio or overlays remaining.
        let next = now + dt;
        if next >= content_end {
            return self.stop_at(content_end, StopReason::EndOfContent);
        }
        self.state.current_time = next;
        TickOutcome::Advanced { time: next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_project_model::{Clip, MediaType, OverlayPosition};

    fn clip(id: &str, start: f64, end: f64) -> Clip {
        let mut c = Clip::new(id, id, MediaType::Video, format!("{id}.mp4"), end - start);
        c.start_time = start;
        c.end_time = end;
        c
    }

    fn timeline(clips: &[(f64, f64)]) -> Timeline {
        let mut t = Timeline::new();
        for (i, (s, e)) in clips.iter().enumerate() {
            t.insert(clip(&format!("c{i}"), *s, *e));
        }
        t
    }

    #[test]
    fn test_idle_when_paused() {
        let t = timeline(&[(0.0, 8.0)]);
        let mut transport = Transport::default();
        assert_eq!(transport.tick(&t, VideoPosition::Local(1.0), 0.1), TickOutcome::Idle);
        assert_eq!(transport.current_time(), 0.0);
    }

    #[test]
    fn test_follows_media_inside_clip() {
        let t = timeline(&[(2.0, 8.0)]);
        let mut transport = Transport::default();
        transport.seek(3.0, &t);
        transport.play(&t);
        let out = transport.tick(&t, VideoPosition::Local(1.5), 0.016);
        assert_eq!(out, TickOutcome::Advanced { time: 3.5 });
    }

    #[test]
    fn test_stops_at_end_of_single_clip() {
        let t = timeline(&[(0.0, 8.0)]);
        let mut transport = Transport::default();
        transport.seek(7.9, &t);
        transport.play(&t);
        let out = transport.tick(&t, VideoPosition::Local(8.0), 0.016);
        assert_eq!(
            out,
            TickOutcome::Stopped {
                time: 8.0,
                reason: StopReason::EndOfContent
            }
        );
        assert!(!transport.is_playing());
        assert_eq!(transport.tick(&t, VideoPosition::Ended, 0.016), TickOutcome::Idle);
    }

    #[test]
    fn test_cuts_over_gap_to_next_clip() {
        let t = timeline(&[(0.0, 4.0), (10.0, 12.0)]);
        let mut transport = Transport::default();
        transport.seek(3.99, &t);
        transport.play(&t);
        let out = transport.tick(&t, VideoPosition::Ended, 0.016);
        assert_eq!(out, TickOutcome::Jumped { from: 3.99, to: 10.0 });
    }

    #[test]
    fn test_adjacent_clip_hands_over() {
        let t = timeline(&[(0.0, 4.0), (4.0, 6.0)]);
        let mut transport = Transport::default();
        transport.seek(3.9, &t);
        transport.play(&t);
        let out = transport.tick(&t, VideoPosition::Local(4.2), 0.016);
        assert_eq!(out, TickOutcome::Jumped { from: 3.9, to: 4.0 });
        assert!(transport.is_playing());
    }

    #[test]
    fn test_gap_jumps_forward() {
        let t = timeline(&[(5.0, 9.0)]);
        let mut transport = Transport::default();
        transport.play(&t);
        let out = transport.tick(&t, VideoPosition::Detached, 0.016);
        assert_eq!(out, TickOutcome::Jumped { from: 0.0, to: 5.0 });
    }

    #[test]
    fn test_empty_timeline_runs_to_ceiling() {
        let t = Timeline::new();
        let mut transport = Transport::default();
        transport.seek(29.99, &t);
        transport.play(&t);
        let out = transport.tick(&t, VideoPosition::Detached, 0.016);
        assert_eq!(
            out,
            TickOutcome::Stopped {
                time: 30.0,
                reason: StopReason::EmptyTimelineLimit
            }
        );
    }

    #[test]
    fn test_empty_timeline_steps_fixed_frames() {
        let t = Timeline::new();
        let mut transport = Transport::default();
        transport.play(&t);
        transport.tick(&t, VideoPosition::Detached, 5.0);
        assert!((transport.current_time() - EMPTY_TIMELINE_STEP_SECS).abs() < 1e-12);
    }

    #[test]
    fn test_audio_tail_plays_out() {
        let mut t = timeline(&[(0.0, 2.0)]);
        t.add_voiceover(Some(0.0), 3.0, "vo.wav");
        let mut transport = Transport::default();
        transport.seek(1.9, &t);
        transport.play(&t);

        assert_eq!(
            transport.tick(&t, VideoPosition::Ended, 0.1),
            TickOutcome::Jumped { from: 1.9, to: 2.0 }
        );
        assert_eq!(
            transport.tick(&t, VideoPosition::Detached, 0.5),
            TickOutcome::Advanced { time: 2.5 }
        );
        assert_eq!(
            transport.tick(&t, VideoPosition::Detached, 0.75),
            TickOutcome::Stopped {
                time: 3.0,
                reason: StopReason::EndOfContent
            }
        );
    }

    #[test]
    fn test_overlay_only_timeline_stops_at_overlay_end() {
        let mut t = Timeline::new();
        t.add_overlay("Caption", 0.0, Some(1.0), OverlayPosition::Center, None);
        let mut transport = Transport::default();
        transport.play(&t);
        let mut last = TickOutcome::Idle;
        for _ in 0..20 {
            last = transport.tick(&t, VideoPosition::Detached, 0.1);
            if matches!(last, TickOutcome::Stopped { .. }) {
                break;
            }
        }
        assert!(matches!(last, TickOutcome::Stopped { time, .. } if time == 1.0));
    }

    #[test]
    fn test_seek_clamps_and_keeps_state() {
        let t = timeline(&[(0.0, 8.0)]);
        let mut transport = Transport::default();
        transport.seek(20.0, &t);
        assert_eq!(transport.current_time(), 8.0);
        transport.seek(-3.0, &t);
        assert_eq!(transport.current_time(), 0.0);
        transport.seek(f64::NAN, &t);
        assert_eq!(transport.current_time(), 0.0);
        assert!(!transport.is_playing());
    }

    #[test]
    fn test_play_at_end_rewinds() {
        let t = timeline(&[(0.0, 8.0)]);
        let mut transport = Transport::default();
        transport.seek(8.0, &t);
        transport.play(&t);
        assert_eq!(transport.current_time(), 0.0);
    }
}
