//! Import clips from gallery listings and generation responses.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use storyreel_common::AppConfig;
use storyreel_project_model::{parse_gallery_listing, parse_generation_response, Clip, Project};

use super::{commit, load, open_store};

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Add clips to the library, optionally dropping each onto the timeline.
fn add_clips(project: &mut Project, clips: Vec<Clip>, place: bool) -> anyhow::Result<()> {
    for clip in clips {
        let id = project.add_to_library(clip);
        if place {
            let placed = project.drop_from_library(&id)?;
            println!("  {id} -> {placed}");
        } else {
            println!("  {id}");
        }
    }
    Ok(())
}

pub fn gallery(config: &AppConfig, key: &str, listing: &Path, place: bool) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;

    let items = parse_gallery_listing(&read_json(listing)?);
    println!("Gallery: {} videos", items.len());
    let base = &config.editor.media_base_url;
    let clips = items.iter().map(|item| item.to_clip(base)).collect();
    add_clips(&mut project, clips, place)?;

    commit(&store, &mut project)
}

pub fn generation(
    config: &AppConfig,
    key: &str,
    response: &Path,
    prompt: Option<String>,
    place: bool,
) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = load(&store, key)?;

    let parsed = parse_generation_response(&read_json(response)?);
    if parsed.scenes.is_empty() && parsed.clips.is_empty() && parsed.video.is_none() {
        tracing::warn!(path = %response.display(), "Generation response carried nothing usable");
    }

    if let Some(prompt) = prompt {
        project.prompt = prompt;
    }
    // A new generation replaces the previous scene list.
    project.timeline.scenes = parsed.scenes.clone();
    println!(
        "Scenes: {} ({:.1}s total)",
        parsed.scenes.len(),
        project.timeline.scenes_duration()
    );
    if let Some(video) = &parsed.video {
        println!("Rendered video: {} ({})", video.url, video.status);
    }

    let clips = parsed.library_clips(&config.editor.media_base_url);
    println!("Generated clips: {}", clips.len());
    add_clips(&mut project, clips, place)?;

    commit(&store, &mut project)
}
