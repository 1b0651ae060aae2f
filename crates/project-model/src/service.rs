//! Response schemas for the generation and gallery services.
//!
//! Both services are opaque producers. Their JSON is validated here, in one
//! place: missing or mistyped fields become defaults (empty collections, the
//! unknown-duration fallback) instead of errors, and relative media paths
//! are resolved against the configured base URL.

use serde::Serialize;
use serde_json::Value;

use storyreel_common::QualityPreset;

use crate::clip::{Clip, MediaType, Scene};
use crate::time::{safe_duration, timecode_to_seconds, UNKNOWN_DURATION_SECS};

/// Body sent to the generation service.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub quality: QualityPreset,
}

/// A pre-rendered segment returned alongside the scenes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedClip {
    pub id: String,
    pub name: String,
    pub duration_secs: f64,
    pub video_url: Option<String>,
    pub thumbnail: Option<String>,
}

/// The fully rendered animation, when the service produced one.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVideo {
    pub url: String,
    pub status: String,
    pub available: bool,
    pub thumbnail: Option<String>,
}

/// Normalized generation response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    pub scenes: Vec<Scene>,
    pub clips: Vec<GeneratedClip>,
    pub video: Option<RenderedVideo>,
}

/// One entry of the gallery listing.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryItem {
    pub id: String,
    pub title: String,
    pub video_url: String,
    pub thumbnail: Option<String>,
    /// Raw duration string (`HH:MM:SS` or `"Unknown"`).
    pub duration: String,
    pub category: String,
}

/// Join a possibly relative media path onto `base_url`.
pub fn resolve_media_url(base_url: &str, url: &str) -> String {
    const ABSOLUTE: [&str; 5] = ["http://", "https://", "file://", "blob:", "data:"];
    let absolute = ABSOLUTE.iter().any(|scheme| url.starts_with(scheme));
    if absolute || (base_url.is_empty() && url.starts_with('/')) {
        return url.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

fn str_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn duration_field(obj: &Value, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(timecode_to_seconds(s)),
        _ => None,
    }
}

fn array_field<'a>(obj: &'a Value, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Normalize a generation response. Accepts the payload either bare or
/// wrapped in `{ "data": ... }`.
pub fn parse_generation_response(value: &Value) -> GenerationResponse {
    let data = value.get("data").filter(|d| d.is_object()).unwrap_or(value);

    let scenes = array_field(data, "scenes")
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let id = str_field(raw, "id").unwrap_or_else(|| format!("scene-{}", idx + 1));
            let name = str_field(raw, "name").unwrap_or_else(|| format!("Scene {}", idx + 1));
            let duration_ms = raw
                .get("durationMs")
                .or_else(|| raw.get("duration"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let mut scene = Scene::new(id, name, duration_ms);
            scene.description = str_field(raw, "description");
            scene
        })
        .collect();

    let clips = array_field(data, "clips")
        .iter()
        .enumerate()
        .map(|(idx, raw)| GeneratedClip {
            id: str_field(raw, "id").unwrap_or_else(|| format!("clip-{}", idx + 1)),
            name: str_field(raw, "name").unwrap_or_else(|| format!("Clip {}", idx + 1)),
            duration_secs: safe_duration(
                duration_field(raw, "duration").unwrap_or(UNKNOWN_DURATION_SECS),
                UNKNOWN_DURATION_SECS,
            ),
            video_url: str_field(raw, "video_url").filter(|u| !u.is_empty()),
            thumbnail: str_field(raw, "thumbnail").filter(|u| !u.is_empty()),
        })
        .collect();

    let video = data.get("video").filter(|v| v.is_object()).and_then(|raw| {
        let url = str_field(raw, "url")?;
        Some(RenderedVideo {
            url,
            status: str_field(raw, "status").unwrap_or_default(),
            available: raw.get("available").and_then(Value::as_bool).unwrap_or(false),
            thumbnail: str_field(raw, "thumbnail"),
        })
    });

    GenerationResponse {
        scenes,
        clips,
        video,
    }
}

impl GenerationResponse {
    /// Library clips for every generated segment that has media.
    pub fn library_clips(&self, base_url: &str) -> Vec<Clip> {
        let mut clips: Vec<Clip> = self
            .clips
            .iter()
            .filter_map(|generated| {
                let url = generated.video_url.as_deref()?;
                let mut clip = Clip::new(
                    generated.id.clone(),
                    generated.name.clone(),
                    MediaType::Video,
                    resolve_media_url(base_url, url),
                    generated.duration_secs,
                );
                clip.thumbnail = generated
                    .thumbnail
                    .as_deref()
                    .map(|t| resolve_media_url(base_url, t));
                Some(clip)
            })
            .collect();

        if let Some(video) = self.video.as_ref().filter(|v| v.available) {
            let duration = safe_duration(
                self.scenes.iter().map(Scene::duration_secs).sum(),
                UNKNOWN_DURATION_SECS,
            );
            let mut clip = Clip::new(
                "generated-video",
                "Generated Animation",
                MediaType::Video,
                resolve_media_url(base_url, &video.url),
                duration,
            );
            clip.thumbnail = video
                .thumbnail
                .as_deref()
                .map(|t| resolve_media_url(base_url, t));
            clips.push(clip);
        }
        clips
    }
}

/// Normalize a gallery listing: either a bare array or `{ "videos": [...] }`.
/// Entries without an id or video URL are skipped.
pub fn parse_gallery_listing(value: &Value) -> Vec<GalleryItem> {
    let items = value
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_else(|| array_field(value, "videos"));

    items
        .iter()
        .filter_map(|raw| {
            let id = str_field(raw, "id")?;
            let video_url = str_field(raw, "video_url").filter(|u| !u.is_empty())?;
            Some(GalleryItem {
                title: str_field(raw, "title").unwrap_or_else(|| id.clone()),
                id,
                video_url,
                thumbnail: str_field(raw, "thumbnail").filter(|t| !t.is_empty()),
                duration: str_field(raw, "duration").unwrap_or_else(|| "Unknown".to_string()),
                category: str_field(raw, "category").unwrap_or_default(),
            })
        })
        .collect()
}

impl GalleryItem {
    /// Library clip for this gallery video, id `gallery-<id>`.
    pub fn to_clip(&self, base_url: &str) -> Clip {
        let mut clip = Clip::new(
            format!("gallery-{}", self.id),
            self.title.clone(),
            MediaType::Video,
            resolve_media_url(base_url, &self.video_url),
            timecode_to_seconds(&self.duration),
        );
        clip.thumbnail = self
            .thumbnail
            .as_deref()
            .map(|t| resolve_media_url(base_url, t));
        clip
    }
}
