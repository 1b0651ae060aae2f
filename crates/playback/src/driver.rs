//! Playback driver.
//!
//! [`Player`] bundles the transport, the media synchronizer and the backend
//! into one steppable unit. [`spawn_playback`] runs a player on a tokio task
//! at a fixed tick rate until content ends or the handle is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use storyreel_common::{EditClock, PlaybackConfig, StoryreelError, StoryreelResult};
use storyreel_project_model::Timeline;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::media::MediaBackend;
use crate::sync::MediaSync;
use crate::transport::{StopReason, TickOutcome, Transport, TransportState};

/// A preview player over one media backend.
pub struct Player {
    transport: Transport,
    sync: MediaSync,
    backend: Box<dyn MediaBackend>,
}

impl Player {
    pub fn new(mut backend: Box<dyn MediaBackend>, config: &PlaybackConfig) -> Self {
        let sync = MediaSync::new(backend.as_mut(), config);
        tracing::debug!(backend = %backend.name(), "Player created");
        Self {
            transport: Transport::new(config),
            sync,
            backend,
        }
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn current_time(&self) -> f64 {
        self.transport.current_time()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn media(&self) -> &MediaSync {
        &self.sync
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn play(&mut self, timeline: &Timeline) {
        self.transport.play(timeline);
        self.resync(timeline);
    }

    pub fn pause(&mut self, timeline: &Timeline) {
        self.transport.pause();
        self.resync(timeline);
    }

    /// Move the cursor and rebind media to the new position.
    pub fn seek(&mut self, time: f64, timeline: &Timeline) {
        self.transport.seek(time, timeline);
        self.resync(timeline);
    }

    fn resync(&mut self, timeline: &Timeline) {
        self.sync
            .sync(timeline, self.transport.state(), self.backend.as_mut());
        self.sync.refresh_preloads(timeline, self.backend.as_mut());
    }

    /// Advance by `dt` seconds of host time.
    ///
    /// Pumps the backend, reads the bound element's position, ticks the
    /// transport, then rebinds media to the new cursor.
    pub fn step(&mut self, timeline: &Timeline, dt: f64) -> TickOutcome {
        self.backend.pump(dt);
        let position = self
            .sync
            .video_position(timeline, self.transport.current_time());
        let outcome = self.transport.tick(timeline, position, dt);
        if outcome != TickOutcome::Idle {
            self.resync(timeline);
        }
        outcome
    }

    /// Release every media element.
    pub fn shutdown(&mut self) {
        self.transport.pause();
        self.sync.release();
    }
}

/// Summary of a finished playback run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackReport {
    pub final_time: f64,
    pub reason: StopReason,
    pub ticks: u64,
}

/// Handle to a running playback task.
pub struct PlaybackHandle {
    stop_flag: Arc<AtomicBool>,
    task: JoinHandle<(Player, PlaybackReport)>,
}

impl PlaybackHandle {
    /// Ask the task to stop at its next tick.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task and take back the player.
    pub async fn join(self) -> StoryreelResult<(Player, PlaybackReport)> {
        self.task
            .await
            .map_err(|e| StoryreelError::playback(format!("playback task failed: {e}")))
    }
}

/// Play `timeline` on a background task at `tick_hz`.
///
/// `on_tick` sees every non-idle outcome along with the transport state
/// after it.
pub fn spawn_playback<F>(
    mut player: Player,
    timeline: Arc<Timeline>,
    tick_hz: u32,
    mut on_tick: F,
) -> PlaybackHandle
where
    F: FnMut(TickOutcome, TransportState) + Send + 'static,
{
    let stop_flag = Arc::new(AtomicBool::new(false));
    let flag = stop_flag.clone();
    let period = Duration::from_secs_f64(1.0 / f64::from(tick_hz.max(1)));

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let clock = EditClock::start();
        let mut last = clock.elapsed_secs();
        let mut ticks = 0u64;

        player.play(&timeline);
        tracing::info!(
            backend = %player.backend_name(),
            tick_hz,
            start = player.current_time(),
            "Playback loop started"
        );

        let reason = loop {
            interval.tick().await;
            if flag.load(Ordering::SeqCst) {
                player.pause(&timeline);
                break StopReason::Requested;
            }

            let now = clock.elapsed_secs();
            let dt = now - last;
            last = now;
            ticks += 1;

            let outcome = player.step(&timeline, dt);
            match outcome {
                TickOutcome::Idle => {
                    // Paused from outside the loop.
                    break StopReason::Requested;
                }
                TickOutcome::Stopped { reason, .. } => {
                    on_tick(outcome, player.state());
                    break reason;
                }
                _ => on_tick(outcome, player.state()),
            }
        };

        let report = PlaybackReport {
            final_time: player.current_time(),
            reason,
            ticks,
        };
        tracing::info!(
            time = report.final_time,
            ticks = report.ticks,
            reason = ?report.reason,
            "Playback loop finished"
        );
        (player, report)
    });

    PlaybackHandle { stop_flag, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedBackend, SimulatedSource};
    use storyreel_project_model::{Clip, MediaType};

    fn placed(id: &str, url: &str, start: f64, end: f64) -> Clip {
        let mut c = Clip::new(id, id, MediaType::Video, url, end - start);
        c.start_time = start;
        c.end_time = end;
        c
    }

    fn player() -> Player {
        let backend = SimulatedBackend::default()
            .with_source("a.mp4", SimulatedSource::new(20.0))
            .with_source("b.mp4", SimulatedSource::new(20.0));
        Player::new(Box::new(backend), &PlaybackConfig::default())
    }

    #[test]
    fn test_step_plays_single_clip_to_end() {
        let mut timeline = Timeline::new();
        timeline.insert(placed("a", "a.mp4", 0.0, 8.0));
        let mut player = player();
        player.play(&timeline);

        let mut last = TickOutcome::Idle;
        for _ in 0..1000 {
            last = player.step(&timeline, 0.1);
            if matches!(last, TickOutcome::Stopped { .. }) {
                break;
            }
        }
        assert_eq!(
            last,
            TickOutcome::Stopped {
                time: 8.0,
                reason: StopReason::EndOfContent
            }
        );
        assert!(!player.is_playing());
    }

    #[test]
    fn test_seek_rebinds_media() {
        let mut timeline = Timeline::new();
        timeline.insert(placed("a", "a.mp4", 0.0, 4.0));
        timeline.insert(placed("b", "b.mp4", 6.0, 10.0));
        let mut player = player();
        player.seek(7.0, &timeline);
        assert_eq!(player.media().bound_clip(), Some("b"));
        assert_eq!(player.media().video_source().as_deref(), Some("b.mp4"));
        assert!(!player.is_playing());
    }

    #[test]
    fn test_paused_step_is_idle() {
        let mut timeline = Timeline::new();
        timeline.insert(placed("a", "a.mp4", 0.0, 4.0));
        let mut player = player();
        assert_eq!(player.step(&timeline, 0.5), TickOutcome::Idle);
        assert_eq!(player.current_time(), 0.0);
    }

    #[tokio::test]
    async fn test_spawned_playback_reaches_end() {
        let mut timeline = Timeline::new();
        timeline.insert(placed("a", "a.mp4", 0.0, 0.25));
        let handle = spawn_playback(player(), Arc::new(timeline), 200, |_, _| {});
        let (_player, report) = handle.join().await.unwrap();
        assert_eq!(report.reason, StopReason::EndOfContent);
        assert_eq!(report.final_time, 0.25);
        assert!(report.ticks > 0);
    }

    #[tokio::test]
    async fn test_spawned_playback_can_be_stopped() {
        let mut timeline = Timeline::new();
        timeline.insert(placed("a", "a.mp4", 0.0, 20.0));
        let handle = spawn_playback(player(), Arc::new(timeline), 100, |_, _| {});
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        let (player, report) = handle.join().await.unwrap();
        assert_eq!(report.reason, StopReason::Requested);
        assert!(!player.is_playing());
        assert!(report.final_time < 20.0);
    }
}
