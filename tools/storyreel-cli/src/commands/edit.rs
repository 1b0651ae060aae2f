//! Timeline editing commands.

use storyreel_common::AppConfig;
use storyreel_playback::{FfprobeProbe, MetadataProbe};
use storyreel_project_model::{Clip, MediaType, OverlayPosition, TrackKind};

use super::{commit, load, open_store};

/// Display name for an uploaded file: its file name without the directory.
fn default_name(url: &str) -> String {
    url.rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(url)
        .to_string()
}

pub async fn add(
    config: &AppConfig,
    key: &str,
    url: String,
    name: Option<String>,
    track: TrackKind,
    duration: Option<f64>,
    library_only: bool,
) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;

    let duration = match duration {
        Some(secs) => secs,
        None => {
            let probe = FfprobeProbe::new(config.export.ffprobe_path.clone());
            match probe.probe(&url).await {
                Ok(meta) => meta.duration_secs,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Could not read media duration");
                    config.editor.unknown_duration_secs
                }
            }
        }
    };

    let media_type = match track {
        TrackKind::Video => MediaType::Video,
        TrackKind::Audio => MediaType::Audio,
    };
    let name = name.unwrap_or_else(|| default_name(&url));
    let clip = Clip::new(
        format!("upload-{}", project.library.len() + 1),
        name,
        media_type,
        url,
        duration,
    );
    let library_id = project.add_to_library(clip);
    println!("Added {library_id} to the library");

    if !library_only {
        let placed = project.drop_from_library(&library_id)?;
        if let Some(clip) = project.timeline.clip(&placed) {
            println!(
                "Placed {placed} at {:.3}s - {:.3}s",
                clip.start_time, clip.end_time
            );
        }
    }

    commit(&store, &mut project)
}

pub fn overlay(
    config: &AppConfig,
    key: &str,
    text: String,
    start: f64,
    duration: Option<f64>,
    position: OverlayPosition,
    font_size: Option<f32>,
) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    let id = project
        .timeline
        .add_overlay(text, start, duration, position, font_size);
    println!("Added overlay {id}");
    commit(&store, &mut project)
}

pub fn voiceover(
    config: &AppConfig,
    key: &str,
    url: &str,
    duration: f64,
    at: Option<f64>,
) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    let id = project.timeline.add_voiceover(at, duration, url);
    if let Some(clip) = project.timeline.clip(&id) {
        println!("Added {} as {id} at {:.3}s", clip.name, clip.start_time);
    }
    commit(&store, &mut project)
}

pub fn split(config: &AppConfig, key: &str, clip: &str, offset: f64) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    match project.timeline.split(clip, offset) {
        Some((first, second)) => {
            println!("Split {clip} into {first} and {second}");
            commit(&store, &mut project)
        }
        None => {
            println!("Nothing to split: {clip} missing or offset {offset} outside the clip");
            Ok(())
        }
    }
}

pub fn split_at(config: &AppConfig, key: &str, time: f64) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    let epsilon = config.editor.playhead_split_epsilon_secs;
    match project.timeline.split_at_playhead(time, epsilon) {
        Some((first, second)) => {
            println!("Split at {time:.3}s into {first} and {second}");
            project.current_time = time;
            commit(&store, &mut project)
        }
        None => {
            println!("No video clip under {time:.3}s far enough from its edges");
            Ok(())
        }
    }
}

pub fn trim(
    config: &AppConfig,
    key: &str,
    clip: &str,
    start: f64,
    end: f64,
    strict: bool,
) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    if strict {
        project.timeline.trim_checked(clip, start, end)?;
    } else if !project.timeline.trim(clip, start, end) {
        anyhow::bail!("Cannot trim {clip} to [{start}, {end})");
    }
    println!("Trimmed {clip} to [{start:.3}, {end:.3})");
    let overlaps = project.timeline.overlap_report();
    for line in &overlaps {
        println!("[WARN] {line}");
    }
    commit(&store, &mut project)
}

pub fn delete(config: &AppConfig, key: &str, clip: &str) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    match project.timeline.delete(clip) {
        Some(removed) => {
            println!("Deleted {} ({})", removed.id, removed.name);
            commit(&store, &mut project)
        }
        None => {
            println!("No clip {clip}");
            Ok(())
        }
    }
}

pub fn arrange(config: &AppConfig, key: &str, track: TrackKind) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;
    project.timeline.arrange(track);
    let clips = project.timeline.track(track);
    println!("Arranged {} clips on the {track:?} track", clips.len());
    for c in clips {
        println!("  {:<28} {:.3}s - {:.3}s", c.id, c.start_time, c.end_time);
    }
    commit(&store, &mut project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_uses_file_name() {
        assert_eq!(default_name("/media/intro.mp4"), "intro.mp4");
        assert_eq!(default_name("http://host/clips/outro.webm"), "outro.webm");
        assert_eq!(default_name("C:\\clips\\a.mp4"), "a.mp4");
        assert_eq!(default_name("plain.mp4"), "plain.mp4");
    }
}
