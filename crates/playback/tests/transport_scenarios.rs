//! End-to-end playback scenarios over the simulated backend.

use proptest::prelude::*;
use storyreel_common::PlaybackConfig;
use storyreel_playback::{
    ClipStatus, Player, SimulatedBackend, SimulatedSource, StopReason, TickOutcome,
};
use storyreel_project_model::{Clip, MediaType, Timeline};

fn placed(id: &str, url: &str, start: f64, end: f64) -> Clip {
    let mut c = Clip::new(id, id, MediaType::Video, url, end - start);
    c.start_time = start;
    c.end_time = end;
    c
}

/// Step until playback stops, returning every outcome.
fn run(player: &mut Player, timeline: &Timeline, dt: f64) -> Vec<TickOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..20_000 {
        let outcome = player.step(timeline, dt);
        outcomes.push(outcome);
        if matches!(outcome, TickOutcome::Stopped { .. } | TickOutcome::Idle) {
            break;
        }
    }
    outcomes
}

fn last_stop(outcomes: &[TickOutcome]) -> Option<(f64, StopReason)> {
    match outcomes.last() {
        Some(TickOutcome::Stopped { time, reason }) => Some((*time, *reason)),
        _ => None,
    }
}

#[test]
fn single_clip_plays_to_its_end_and_stops() {
    let backend = SimulatedBackend::default().with_source("a.mp4", SimulatedSource::new(12.0));
    let mut timeline = Timeline::new();
    timeline.insert(placed("a", "a.mp4", 0.0, 8.0));

    let mut player = Player::new(Box::new(backend), &PlaybackConfig::default());
    player.play(&timeline);
    let outcomes = run(&mut player, &timeline, 1.0 / 60.0);

    assert_eq!(last_stop(&outcomes), Some((8.0, StopReason::EndOfContent)));
    assert!(!player.is_playing());

    // Playing again from the end rewinds.
    player.play(&timeline);
    assert_eq!(player.current_time(), 0.0);
}

#[test]
fn gaps_are_skipped() {
    let backend = SimulatedBackend::default()
        .with_source("a.mp4", SimulatedSource::new(10.0))
        .with_source("b.mp4", SimulatedSource::new(10.0));
    let mut timeline = Timeline::new();
    timeline.insert(placed("a", "a.mp4", 0.0, 2.0));
    timeline.insert(placed("b", "b.mp4", 5.0, 7.0));

    let mut player = Player::new(Box::new(backend), &PlaybackConfig::default());
    player.play(&timeline);
    let outcomes = run(&mut player, &timeline, 0.05);

    assert!(outcomes
        .iter()
        .any(|o| matches!(o, TickOutcome::Jumped { to, .. } if *to == 5.0)));
    assert!(!outcomes.iter().any(|o| matches!(
        o,
        TickOutcome::Advanced { time } if *time > 2.0 && *time < 5.0
    )));
    assert_eq!(last_stop(&outcomes), Some((7.0, StopReason::EndOfContent)));
}

#[test]
fn broken_media_does_not_freeze_playback() {
    let backend = SimulatedBackend::default()
        .with_source("bad.mp4", SimulatedSource::new(10.0).failing("decoder crashed"))
        .with_source("good.mp4", SimulatedSource::new(10.0));
    let mut timeline = Timeline::new();
    timeline.insert(placed("bad", "bad.mp4", 0.0, 1.0));
    timeline.insert(placed("good", "good.mp4", 1.0, 2.0));

    let mut player = Player::new(Box::new(backend), &PlaybackConfig::default());
    player.play(&timeline);
    assert!(matches!(
        player.media().status("bad"),
        Some(ClipStatus::Unavailable { .. })
    ));

    let outcomes = run(&mut player, &timeline, 0.05);
    assert_eq!(last_stop(&outcomes), Some((2.0, StopReason::EndOfContent)));
    assert_eq!(player.media().status("good"), Some(&ClipStatus::Ready));
}

#[test]
fn preloaded_source_is_handed_over() {
    let backend = SimulatedBackend::default()
        .with_source("a.mp4", SimulatedSource::new(10.0))
        .with_source("b.mp4", SimulatedSource::new(10.0).with_load_secs(1.0));
    let mut timeline = Timeline::new();
    timeline.insert(placed("a", "a.mp4", 0.0, 3.0));
    timeline.insert(placed("b", "b.mp4", 3.0, 4.0));

    let mut player = Player::new(Box::new(backend), &PlaybackConfig::default());
    player.play(&timeline);
    let before: Vec<String> = player
        .media()
        .preload_progress()
        .into_iter()
        .map(|p| p.url)
        .collect();
    assert_eq!(before, ["b.mp4"]);

    let outcomes = run(&mut player, &timeline, 0.05);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, TickOutcome::Jumped { to, .. } if *to == 3.0)));
    assert_eq!(last_stop(&outcomes), Some((4.0, StopReason::EndOfContent)));

    // The outgoing element went back to the pool under its own source.
    let after: Vec<String> = player
        .media()
        .preload_progress()
        .into_iter()
        .map(|p| p.url)
        .collect();
    assert_eq!(after, ["a.mp4"]);
}

#[test]
fn empty_timeline_runs_to_ceiling() {
    let config = PlaybackConfig {
        empty_timeline_limit_secs: 2.0,
        ..PlaybackConfig::default()
    };
    let mut player = Player::new(Box::new(SimulatedBackend::default()), &config);
    let timeline = Timeline::new();
    player.play(&timeline);
    let outcomes = run(&mut player, &timeline, 0.1);
    assert_eq!(
        last_stop(&outcomes),
        Some((2.0, StopReason::EmptyTimelineLimit))
    );
}

proptest! {
    /// Any gapped video-only timeline plays monotonically to its content end.
    #[test]
    fn playback_reaches_content_end(
        layout in prop::collection::vec((0u32..12, 1u32..12), 1..6),
        dt_ms in 10u32..120,
    ) {
        let mut backend = SimulatedBackend::default();
        let mut timeline = Timeline::new();
        let mut cursor = 0.0;
        for (i, (gap, span)) in layout.iter().enumerate() {
            let start = cursor + *gap as f64 * 0.25;
            let end = start + *span as f64 * 0.25;
            let url = format!("clip{i}.mp4");
            backend = backend.with_source(url.clone(), SimulatedSource::new(60.0));
            timeline.insert(placed(&format!("c{i}"), &url, start, end));
            cursor = end;
        }

        let mut player = Player::new(Box::new(backend), &PlaybackConfig::default());
        player.play(&timeline);
        let outcomes = run(&mut player, &timeline, dt_ms as f64 / 1000.0);

        prop_assert_eq!(last_stop(&outcomes), Some((cursor, StopReason::EndOfContent)));

        let mut previous = 0.0;
        for outcome in &outcomes {
            let time = match *outcome {
                TickOutcome::Advanced { time } => time,
                TickOutcome::Jumped { to, .. } => to,
                TickOutcome::Stopped { time, .. } => time,
                TickOutcome::Idle => previous,
            };
            prop_assert!(time >= previous, "cursor went back from {} to {}", previous, time);
            previous = time;
        }
    }
}
