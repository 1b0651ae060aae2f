//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where project snapshots are stored.
    pub projects_dir: PathBuf,

    /// Timeline editing defaults.
    pub editor: EditorDefaults,

    /// Preview playback tuning.
    pub playback: PlaybackConfig,

    /// Default export parameters.
    pub export: ExportDefaults,

    /// Auto-snapshot policy.
    pub autosave: AutosaveConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Timeline editing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorDefaults {
    /// Floor for the derived timeline duration (seconds).
    pub default_timeline_secs: f64,

    /// Duration assigned to media whose length is unknown (seconds).
    pub unknown_duration_secs: f64,

    /// Minimum distance from a clip edge for a playhead split (seconds).
    pub playhead_split_epsilon_secs: f64,

    /// Base URL that relative gallery/generation media paths resolve against.
    pub media_base_url: String,
}

/// Preview playback tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Transport tick rate (Hz).
    pub tick_hz: u32,

    /// Media elements are only re-seeked when they drift further than this.
    pub seek_tolerance_secs: f64,

    /// Ceiling for free-running playback on a timeline with no clips.
    pub empty_timeline_limit_secs: f64,

    /// Preload every video source into off-screen elements.
    pub preload: bool,
}

/// Export quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    Medium,
    #[default]
    High,
}

/// Output container for exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp4,
    Webm,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Webm => "webm",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "video/mp4",
            ExportFormat::Webm => "video/webm",
        }
    }
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Resolution/bitrate preset.
    pub quality: QualityPreset,

    /// Output container.
    pub format: ExportFormat,

    /// Render frame rate.
    pub fps: u32,

    /// Shortest export produced, even for an empty timeline (seconds).
    pub min_duration_secs: f64,

    /// Encoder binary.
    pub ffmpeg_path: String,

    /// Probe binary.
    pub ffprobe_path: String,

    /// Font used for text overlays and the placeholder card.
    pub font_path: Option<PathBuf>,
}

/// Auto-snapshot policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Whether auto-snapshots run at all.
    pub enabled: bool,

    /// Periodic snapshot interval while the timeline is non-empty.
    pub interval_secs: u64,

    /// Quiet period after an edit before a snapshot is taken.
    pub debounce_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "storyreel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            projects_dir: dirs_default_projects(),
            editor: EditorDefaults::default(),
            playback: PlaybackConfig::default(),
            export: ExportDefaults::default(),
            autosave: AutosaveConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EditorDefaults {
    fn default() -> Self {
        Self {
            default_timeline_secs: 30.0,
            unknown_duration_secs: 10.0,
            playhead_split_epsilon_secs: 0.1,
            media_base_url: "http://localhost:5001".to_string(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            seek_tolerance_secs: 0.1,
            empty_timeline_limit_secs: 30.0,
            preload: true,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            quality: QualityPreset::High,
            format: ExportFormat::Mp4,
            fps: 30,
            min_duration_secs: 5.0,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            font_path: None,
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            debounce_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("storyreel").join("config.json")
}

/// Default projects directory.
fn dirs_default_projects() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("storyreel").join("projects")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"export": {"quality": "low"}}"#).unwrap();
        assert_eq!(parsed.export.quality, QualityPreset::Low);
        assert_eq!(parsed.export.fps, 30);
        assert_eq!(parsed.playback.tick_hz, 60);
        assert!((parsed.editor.unknown_duration_secs - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_export_format_naming() {
        let parsed: ExportFormat = serde_json::from_str(r#""webm""#).unwrap();
        assert_eq!(parsed.extension(), "webm");
        assert_eq!(ExportFormat::Mp4.mime_type(), "video/mp4");
    }

    #[test]
    fn test_unparsable_config_falls_back() {
        let path = std::env::temp_dir().join("storyreel_test_bad_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.autosave.interval_secs, 30);
        std::fs::remove_file(&path).ok();
    }
}
