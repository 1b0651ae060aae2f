//! Headless preview: run the transport against simulated media elements.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use storyreel_common::{AppConfig, EditClock};
use storyreel_playback::{
    spawn_playback, ClipStatus, PlaybackReport, Player, SimulatedBackend, SimulatedSource,
    StopReason, TickOutcome,
};
use storyreel_project_model::{Autosaver, Timeline};

use super::{commit, load, open_store};

pub struct PlayOptions {
    pub from: f64,
    pub sample: f64,
    pub fail: Vec<String>,
    pub load_secs: f64,
    pub realtime: bool,
    pub max_secs: Option<f64>,
    pub save: bool,
}

/// Simulated sources for every clip on the timeline.
fn simulated_backend(timeline: &Timeline, options: &PlayOptions) -> SimulatedBackend {
    let mut backend = SimulatedBackend::default();
    for clip in timeline.video_track.iter().chain(&timeline.audio_track) {
        let mut source =
            SimulatedSource::new(clip.source_duration_secs).with_load_secs(options.load_secs);
        if options.fail.iter().any(|url| url == &clip.source_url) {
            source = source.failing("simulated load failure");
        }
        backend = backend.with_source(clip.source_url.clone(), source);
    }
    backend
}

/// Prints jumps and one cursor sample per `every` seconds of timeline time.
struct Trajectory {
    every: f64,
    next: f64,
}

impl Trajectory {
    fn new(every: f64, start: f64) -> Self {
        Self {
            every: if every.is_finite() && every > 0.0 { every } else { 1.0 },
            next: start,
        }
    }

    fn record(&mut self, outcome: TickOutcome, bound: Option<&str>) {
        match outcome {
            TickOutcome::Advanced { time } => {
                if time + 1e-9 >= self.next {
                    println!("  {time:>9.3}s  {}", bound.unwrap_or("-"));
                    self.next = time + self.every;
                }
            }
            TickOutcome::Jumped { from, to } => {
                println!("  {from:>9.3}s  -> {to:.3}s");
                self.next = to;
            }
            TickOutcome::Stopped { time, reason } => {
                println!("  {time:>9.3}s  stopped ({reason:?})");
            }
            TickOutcome::Idle => {}
        }
    }
}

/// Step the transport on a fixed synthetic clock.
fn run_stepped(
    mut player: Player,
    timeline: &Timeline,
    config: &AppConfig,
    options: &PlayOptions,
) -> (Player, PlaybackReport) {
    let dt = 1.0 / f64::from(config.playback.tick_hz.max(1));
    let ceiling = timeline
        .content_end()
        .max(config.playback.empty_timeline_limit_secs);
    // Headroom for simulated buffering stalls.
    let max_ticks = ((ceiling + 60.0 + options.load_secs * 10.0) / dt).ceil() as u64;

    player.play(timeline);
    let mut trajectory = Trajectory::new(options.sample, player.current_time());
    let mut ticks = 0u64;

    let reason = loop {
        if ticks >= max_ticks {
            tracing::warn!(ticks, "Tick budget exhausted, stopping");
            player.pause(timeline);
            break StopReason::Requested;
        }
        ticks += 1;

        let outcome = player.step(timeline, dt);
        trajectory.record(outcome, player.media().bound_clip());
        match outcome {
            TickOutcome::Idle => break StopReason::Requested,
            TickOutcome::Stopped { reason, .. } => break reason,
            _ => {}
        }
    };

    let report = PlaybackReport {
        final_time: player.current_time(),
        reason,
        ticks,
    };
    (player, report)
}

pub async fn run(config: &AppConfig, key: &str, options: PlayOptions) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    let timeline = project.timeline.clone();

    let backend = simulated_backend(&timeline, &options);
    let mut player = Player::new(Box::new(backend), &config.playback);
    if options.from > 0.0 {
        player.seek(options.from, &timeline);
    }

    println!(
        "Playing {} from {:.3}s ({} video, {} audio clips, {} mode)",
        project.title,
        player.current_time(),
        timeline.video_track.len(),
        timeline.audio_track.len(),
        if options.realtime { "realtime" } else { "stepped" }
    );

    let (mut player, report) = if options.realtime {
        let cursor = Arc::new(Mutex::new(player.current_time()));
        let shared = cursor.clone();
        let mut trajectory = Trajectory::new(options.sample, player.current_time());
        let handle = spawn_playback(
            player,
            Arc::new(timeline.clone()),
            config.playback.tick_hz,
            move |outcome, state| {
                trajectory.record(outcome, None);
                if let Ok(mut t) = shared.lock() {
                    *t = state.current_time;
                }
            },
        );

        let mut autosaver = Autosaver::new(&store, &config.autosave);
        let clock = EditClock::start();
        let mut pace = tokio::time::interval(Duration::from_millis(250));
        while !handle.is_finished() {
            pace.tick().await;
            if let Some(limit) = options.max_secs {
                if clock.elapsed_secs() >= limit {
                    handle.stop();
                }
            }
            if options.save {
                if let Ok(t) = cursor.lock() {
                    project.current_time = *t;
                }
                if let Some(reason) = autosaver.tick(clock.elapsed_ns(), &project) {
                    tracing::debug!(?reason, status = ?autosaver.status(), "Auto-save");
                }
            }
        }
        handle.join().await?
    } else {
        run_stepped(player, &timeline, config, &options)
    };

    let unavailable: Vec<(&String, &String)> = player
        .media()
        .statuses()
        .iter()
        .filter_map(|(clip, status)| match status {
            ClipStatus::Unavailable { reason } => Some((clip, reason)),
            _ => None,
        })
        .collect();
    println!();
    println!(
        "Stopped at {:.3}s: {:?} after {} ticks",
        report.final_time, report.reason, report.ticks
    );
    for (clip, reason) in unavailable {
        println!("[WARN] {clip} unavailable: {reason}");
    }
    player.shutdown();

    if options.save {
        project.current_time = report.final_time;
        commit(&store, &mut project)?;
    }
    Ok(())
}
