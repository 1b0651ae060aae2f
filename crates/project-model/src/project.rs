//! Project metadata, the media library, and snapshot serialization.
//!
//! A project ties together the generation prompt, the media library (source
//! clips not yet placed), the timeline, and the transport position. It is
//! persisted as a flat camelCase JSON snapshot. Restoring is lenient: every
//! field that is missing or has the wrong shape falls back to its initial
//! value, and clips with an invalid interval are dropped.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use storyreel_common::StoryreelError;

use crate::clip::{Clip, MediaType, Scene, TextOverlay};
use crate::time::{safe_duration, safe_seconds, UNKNOWN_DURATION_SECS};
use crate::timeline::{Timeline, DEFAULT_TIMELINE_SECS};

/// Current snapshot schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// An editing session's full state.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Persistence key.
    pub id: String,
    pub title: String,
    pub description: String,
    /// Prompt the scenes were generated from.
    pub prompt: String,
    /// Source clips available for dropping onto the timeline.
    pub library: Vec<Clip>,
    pub timeline: Timeline,
    /// Transport position at the time of the last snapshot.
    pub current_time: f64,
    pub created_at: String,
    pub modified_at: String,
}

/// On-disk snapshot layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub schema_version: u32,
    pub id: String,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub scenes: Vec<Scene>,
    pub video_track: Vec<Clip>,
    pub audio_track: Vec<Clip>,
    pub text_overlays: Vec<TextOverlay>,
    pub library: Vec<Clip>,
    pub current_time: f64,
    pub total_duration: f64,
    /// Last value of the timeline's id sequence.
    #[serde(default)]
    pub id_sequence: u64,
    pub created_at: String,
    pub modified_at: String,
}

impl Project {
    /// Create an empty project.
    pub fn new(title: impl Into<String>) -> Self {
        let now = storyreel_common::now_rfc3339();
        Self {
            id: new_project_id(),
            title: title.into(),
            description: String::new(),
            prompt: String::new(),
            library: Vec::new(),
            timeline: Timeline::new(),
            current_time: 0.0,
            created_at: now.clone(),
            modified_at: now,
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.modified_at = storyreel_common::now_rfc3339();
    }

    /// Derived editing duration with the default 30 s floor.
    pub fn total_duration(&self) -> f64 {
        self.timeline.total_duration(DEFAULT_TIMELINE_SECS)
    }

    /// Add a source clip to the library; returns its (possibly renamed) id.
    pub fn add_to_library(&mut self, mut clip: Clip) -> String {
        if self.library.iter().any(|c| c.id == clip.id) {
            let base = clip.id.clone();
            let mut n = 2;
            while self.library.iter().any(|c| c.id == format!("{base}-{n}")) {
                n += 1;
            }
            clip.id = format!("{base}-{n}");
        }
        let id = clip.id.clone();
        self.library.push(clip);
        id
    }

    pub fn library_clip(&self, id: &str) -> Option<&Clip> {
        self.library.iter().find(|c| c.id == id)
    }

    /// Drop a library clip onto its track with gap-fit placement.
    pub fn drop_from_library(&mut self, library_id: &str) -> Result<String, ProjectError> {
        let source = self
            .library_clip(library_id)
            .cloned()
            .ok_or_else(|| ProjectError::validation(format!("no library clip {library_id}")))?;
        Ok(self.timeline.place(&source))
    }

    /// Capture the current state.
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            schema_version: SCHEMA_VERSION,
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            prompt: self.prompt.clone(),
            scenes: self.timeline.scenes.clone(),
            video_track: self.timeline.video_track.clone(),
            audio_track: self.timeline.audio_track.clone(),
            text_overlays: self.timeline.text_overlays.clone(),
            library: self.library.clone(),
            current_time: safe_seconds(self.current_time),
            total_duration: self.total_duration(),
            id_sequence: self.timeline.id_sequence(),
            created_at: self.created_at.clone(),
            modified_at: self.modified_at.clone(),
        }
    }

    pub fn to_json(&self) -> Result<Value, ProjectError> {
        serde_json::to_value(self.snapshot()).map_err(|e| ProjectError::ParseError {
            path: PathBuf::from(format!("<{}>", self.id)),
            source: e,
        })
    }

    /// Parse a snapshot string. Only malformed JSON is an error; shape
    /// problems are repaired by [`Project::restore`].
    pub fn from_json_str(json: &str) -> Result<Self, ProjectError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ProjectError::ParseError {
            path: PathBuf::from("<snapshot>"),
            source: e,
        })?;
        Ok(Self::restore(&value))
    }

    /// Rebuild a project from a snapshot value, defaulting anything missing.
    pub fn restore(value: &Value) -> Self {
        let empty = Map::new();
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                tracing::warn!("Snapshot is not an object, restoring an empty project");
                &empty
            }
        };

        let version: u32 = read_field(obj, "schemaVersion").unwrap_or(SCHEMA_VERSION);
        if version > SCHEMA_VERSION {
            tracing::warn!(version, "Snapshot is newer than this build, restoring known fields");
        }

        let mut project = Project::new(read_field::<String>(obj, "title").unwrap_or_default());
        if let Some(id) = read_field::<String>(obj, "id").filter(|id| !id.is_empty()) {
            project.id = id;
        }
        project.description = read_field(obj, "description").unwrap_or_default();
        project.prompt = read_field(obj, "prompt").unwrap_or_default();
        project.current_time = safe_seconds(read_field(obj, "currentTime").unwrap_or(0.0));
        if let Some(created) = read_field(obj, "createdAt") {
            project.created_at = created;
        }
        if let Some(modified) = read_field(obj, "modifiedAt") {
            project.modified_at = modified;
        }

        for clip in read_clips(obj, "videoTrack", MediaType::Video) {
            project.timeline.insert(clip);
        }
        for clip in read_clips(obj, "audioTrack", MediaType::Audio) {
            project.timeline.insert(clip);
        }
        project.timeline.text_overlays = read_items::<TextOverlay>(obj, "textOverlays")
            .into_iter()
            .filter(|o| o.start_time.is_finite() && o.end_time.is_finite() && o.start_time < o.end_time)
            .collect();
        project.timeline.scenes = read_items(obj, "scenes");
        project
            .timeline
            .resume_id_sequence(read_field(obj, "idSequence").unwrap_or(0));

        for mut clip in read_items::<Clip>(obj, "library") {
            clip.source_duration_secs =
                safe_duration(clip.source_duration_secs, UNKNOWN_DURATION_SECS);
            project.add_to_library(clip);
        }

        project
    }
}

/// Read one field, logging (not failing) on a shape mismatch.
fn read_field<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Option<T> {
    let value = obj.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(field = key, error = %e, "Ignoring malformed snapshot field");
            None
        }
    }
}

/// Read an array element-wise, skipping malformed entries.
fn read_items<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Vec<T> {
    let Some(items) = obj.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(field = key, error = %e, "Dropping malformed snapshot entry");
                None
            }
        })
        .collect()
}

fn read_clips(obj: &Map<String, Value>, key: &str, media_type: MediaType) -> Vec<Clip> {
    read_items::<Clip>(obj, key)
        .into_iter()
        .filter_map(|mut clip| {
            clip.media_type = media_type;
            let span = safe_duration(clip.span(), UNKNOWN_DURATION_SECS);
            clip.source_duration_secs = safe_duration(clip.source_duration_secs, span);
            if clip.has_valid_interval() {
                Some(clip)
            } else {
                tracing::warn!(clip = %clip.id, "Dropping restored clip with invalid interval");
                None
            }
        })
        .collect()
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

impl ProjectError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

impl From<ProjectError> for StoryreelError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::ValidationError { message } => StoryreelError::project(message),
            other => StoryreelError::persistence(other.to_string()),
        }
    }
}

/// Time-derived project id, unique per process run.
fn new_project_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("proj-{nanos:x}-{n}")
}
