//! Storyreel Playback
//!
//! Drives the preview: a logical transport clock that advances against the
//! media element bound to the active clip, the binding discipline that keeps
//! video and audio elements pointed at the right source and offset, and an
//! off-screen preload pool for instant clip transitions.
//!
//! The synchronizer only reads the timeline. Clip intervals are never
//! mutated here; the transport writes `current_time` and element state only.

pub mod driver;
pub mod media;
pub mod preload;
pub mod probe;
pub mod simulated;
pub mod sync;
pub mod transport;

pub use driver::*;
pub use media::*;
pub use preload::*;
pub use probe::*;
pub use simulated::*;
pub use sync::*;
pub use transport::*;
