//! Clock and timing utilities.
//!
//! Two time bases exist in Storyreel:
//! - the *timeline* base, seconds from the start of the edit, used by every
//!   clip interval and by the transport cursor;
//! - the *wall* base, monotonic time since some local epoch, used to pace
//!   ticks, advance simulated media, and schedule auto-snapshots.
//!
//! This module provides the wall-side helpers plus the frame arithmetic the
//! export loop uses to map frame indices onto timeline seconds.

use std::time::Instant;

/// A monotonic clock anchored to the moment it was started.
#[derive(Debug, Clone)]
pub struct EditClock {
    /// The instant the clock started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl EditClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: now_rfc3339(),
        }
    }

    /// Get nanoseconds elapsed since the clock started.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Get seconds elapsed since the clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at clock start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert an elapsed nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds. Negative input saturates to zero.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs.max(0.0) * 1_000_000_000.0) as u64
    }
}

/// Current wall-clock time as RFC 3339.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Fixed-rate frame arithmetic for offline rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    fps: u32,
}

impl FrameRate {
    /// Create a frame rate; zero is bumped to one.
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Number of frames rendered for `duration_secs`: `floor(duration * fps)`.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.fps as f64).floor() as u64
    }

    /// Timeline time of a frame index.
    pub fn frame_time(&self, frame: u64) -> f64 {
        frame as f64 / self.fps as f64
    }

    /// Frame interval in seconds.
    pub fn interval_secs(&self) -> f64 {
        1.0 / self.fps as f64
    }
}

/// Rate controller for periodic work driven by a caller-supplied clock.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self::with_interval_ns(1_000_000_000 / target_hz.max(1) as u64)
    }

    /// Create a controller with an explicit interval.
    pub fn with_interval_ns(interval_ns: u64) -> Self {
        Self {
            target_interval_ns: interval_ns,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Restart the interval from `current_ns` without firing.
    pub fn reset(&mut self, current_ns: u64) {
        self.last_tick_ns = Some(current_ns);
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = EditClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((EditClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
        assert_eq!(EditClock::secs_to_ns(2.0), 2_000_000_000);
        assert_eq!(EditClock::secs_to_ns(-3.0), 0);
    }

    #[test]
    fn test_frame_count_floors() {
        let rate = FrameRate::new(30);
        assert_eq!(rate.frame_count(8.0), 240);
        assert_eq!(rate.frame_count(1.0 / 60.0), 0);
        assert_eq!(rate.frame_count(f64::NAN), 0);
        assert!((rate.frame_time(45) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_fps_is_bumped() {
        assert_eq!(FrameRate::new(0).fps(), 1);
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(60);
        assert!(ctrl.should_tick(0)); // first tick always fires
        assert!(!ctrl.should_tick(1_000_000)); // 1ms later, too soon
        assert!(ctrl.should_tick(17_000_000)); // ~17ms later (60Hz ~ 16.67ms)
    }

    #[test]
    fn test_rate_controller_reset_defers() {
        let mut ctrl = RateController::with_interval_ns(1_000);
        ctrl.reset(500);
        assert!(!ctrl.should_tick(1_000));
        assert!(ctrl.should_tick(1_500));
    }
}
