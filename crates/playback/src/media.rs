//! Media element abstraction.
//!
//! A media element is one decoder/player bound to a single source at a time,
//! modeled on an HTML media element: it has a source, a local playback
//! position, a paused flag, and a readiness level that climbs as data is
//! buffered.

use storyreel_common::StoryreelError;
use storyreel_project_model::MediaType;

/// How much of a source an element has available, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// No source or nothing loaded yet.
    Nothing,
    /// Duration and dimensions are known.
    Metadata,
    /// The frame at the current position is decodable.
    CurrentData,
    /// Enough is buffered to play a little past the current position.
    FutureData,
    /// Enough is buffered to play to the end without stalling.
    EnoughData,
}

impl ReadyState {
    /// Whether the element can be swapped in for an instant transition.
    pub fn can_play_through(self) -> bool {
        self >= ReadyState::FutureData
    }
}

/// Decoded metadata of a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaMetadata {
    pub duration_secs: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Failures reported by media elements and probes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MediaError {
    #[error("Failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Unsupported media source: {url}")]
    UnsupportedSource { url: String },

    #[error("Playback rejected: {reason}")]
    PlayRejected { reason: String },

    #[error("Metadata probe failed for {url}: {reason}")]
    Probe { url: String, reason: String },
}

impl From<MediaError> for StoryreelError {
    fn from(err: MediaError) -> Self {
        StoryreelError::media(err.to_string())
    }
}

/// One player instance.
pub trait MediaElement: Send {
    /// Currently bound source, if any.
    fn source(&self) -> Option<String>;

    /// Bind a new source. Resets position to 0 and readiness to `Nothing`.
    fn set_source(&mut self, url: &str);

    /// Drop the source and release buffered data.
    fn clear_source(&mut self);

    /// Local playback position in seconds.
    fn current_time(&self) -> f64;

    fn seek(&mut self, time: f64);

    /// Start or resume playback. Fails when the source is unplayable.
    fn play(&mut self) -> Result<(), MediaError>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Whether playback reached the end of the source.
    fn has_ended(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    /// Buffered fraction of the source in `[0, 1]`.
    fn buffered_fraction(&self) -> f64;

    /// The load failure for the bound source, if loading failed.
    fn load_error(&self) -> Option<MediaError>;
}

/// Creates media elements and pumps their clocks.
pub trait MediaBackend: Send {
    fn create_element(&mut self, kind: MediaType) -> Box<dyn MediaElement>;

    /// Advance backend-owned clocks by `dt` seconds of host time.
    ///
    /// Elements backed by a real decoder advance on their own; the default
    /// does nothing.
    fn pump(&mut self, _dt: f64) {}

    fn name(&self) -> &str;
}

/// Awaitable metadata decoding.
#[async_trait::async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_ordering() {
        assert!(ReadyState::EnoughData > ReadyState::Metadata);
        assert!(ReadyState::FutureData.can_play_through());
        assert!(!ReadyState::CurrentData.can_play_through());
    }

    #[test]
    fn test_media_error_converts() {
        let err: StoryreelError = MediaError::UnsupportedSource {
            url: "ftp://x".into(),
        }
        .into();
        assert!(err.to_string().contains("ftp://x"));
    }
}
