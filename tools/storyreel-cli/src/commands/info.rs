//! Show project information.

use storyreel_common::AppConfig;
use storyreel_project_model::{seconds_to_timecode, Clip, ProjectStore};

use super::{load, open_store};

fn print_track(label: &str, clips: &[Clip]) {
    println!("{label} ({} clips):", clips.len());
    for c in clips {
        println!(
            "  {:<28} [{} - {}] {} ({})",
            c.id,
            seconds_to_timecode(c.start_time),
            seconds_to_timecode(c.end_time),
            c.name,
            c.display_duration
        );
    }
}

pub fn run(config: &AppConfig, key: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(config);
    let project = load(&store, key)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&project.to_json()?)?);
        return Ok(());
    }

    let timeline = &project.timeline;
    println!("Project: {}", project.title);
    println!("  ID: {}", project.id);
    if !project.description.is_empty() {
        println!("  Description: {}", project.description);
    }
    if !project.prompt.is_empty() {
        println!("  Prompt: {}", project.prompt);
    }
    println!("  Created: {}", project.created_at);
    println!("  Modified: {}", project.modified_at);
    println!(
        "  Duration: {} (content ends at {})",
        seconds_to_timecode(project.total_duration()),
        seconds_to_timecode(timeline.content_end())
    );
    println!("  Playhead: {}", seconds_to_timecode(project.current_time));
    println!();

    print_track("Video track", &timeline.video_track);
    print_track("Audio track", &timeline.audio_track);

    println!("Text overlays ({}):", timeline.text_overlays.len());
    for o in &timeline.text_overlays {
        println!(
            "  {:<28} [{} - {}] {:?} {}px \"{}\"",
            o.id,
            seconds_to_timecode(o.start_time),
            seconds_to_timecode(o.end_time),
            o.position,
            o.font_size,
            o.text
        );
    }

    println!("Scenes ({}):", timeline.scenes.len());
    for s in &timeline.scenes {
        println!("  {:<28} {:>8.0}ms {}", s.id, s.duration_ms, s.name);
    }

    println!("Library ({}):", project.library.len());
    for c in &project.library {
        println!("  {:<28} {:?} {} {}", c.id, c.media_type, c.display_duration, c.source_url);
    }

    let overlaps = timeline.overlap_report();
    if !overlaps.is_empty() {
        println!();
        println!("[WARN] Overlapping clips:");
        for line in overlaps {
            println!("  {line}");
        }
    }

    Ok(())
}

pub fn list(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_store(config);
    let keys = store.list()?;
    if keys.is_empty() {
        println!("No projects in {}", store.root().display());
        return Ok(());
    }
    for key in keys {
        match load(&store, &key) {
            Ok(project) => println!(
                "{key}  {}  ({} video, {} audio, modified {})",
                project.title,
                project.timeline.video_track.len(),
                project.timeline.audio_track.len(),
                project.modified_at
            ),
            Err(e) => println!("{key}  [unreadable: {e}]"),
        }
    }
    Ok(())
}

pub fn remove(config: &AppConfig, key: &str) -> anyhow::Result<()> {
    let store = open_store(config);
    if store.delete(key)? {
        println!("Deleted project {key}");
    } else {
        println!("No project {key}");
    }
    Ok(())
}
