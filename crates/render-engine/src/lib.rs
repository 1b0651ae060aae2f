//! Storyreel Render Engine
//!
//! Offline export pipeline that turns a timeline into a single video file.
//! Every frame is planned, decoded, rasterized and handed to the encoder in
//! order; audio clips are mixed in afterwards.
//!
//! # Pipeline Architecture
//!
//! ```text
//! timeline ──── compose_frame ──┐
//!                               ├── FrameRenderer (letterbox, placeholder, overlays)
//! video clips ── FrameSource ───┘         │
//!                                         ▼
//!                               FrameSink (ffmpeg, raw RGBA on stdin)
//!                                         │
//! audio clips ── amix/adelay ─────────────┤
//!                                         ▼
//!                                   output.mp4 / .webm
//! ```

pub mod compositor;
pub mod encoder;
pub mod export;
pub mod raster;
pub mod source;

pub use compositor::*;
pub use encoder::*;
pub use export::*;
pub use raster::*;
pub use source::*;
