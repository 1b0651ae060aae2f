//! Storyreel Project Model
//!
//! Defines the editing data model and the operations over it:
//! - **Time:** safe-seconds normalization and timecode conversions
//! - **Clips:** video/audio clips, text overlays, generated scenes
//! - **Timeline:** placement, split, trim, delete, arrange, active-clip resolution
//! - **Project:** media library, snapshot serialization, persistence, auto-save
//! - **Service:** normalized generation and gallery responses
//!
//! All times are timeline-absolute seconds. Scene durations arrive in
//! milliseconds and are converted at the boundary.

pub mod autosave;
pub mod clip;
pub mod project;
pub mod service;
pub mod store;
pub mod time;
pub mod timeline;

pub use autosave::*;
pub use clip::*;
pub use project::*;
pub use service::*;
pub use store::*;
pub use time::*;
pub use timeline::*;
