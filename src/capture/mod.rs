//! Capture sources: microphone audio and camera or screen video.
//!
//! Both sources hand encoded payloads to a callback and never touch the
//! transport themselves.

mod audio;
mod video;

pub use audio::{AudioCapture, ChunkCallback};
pub use video::{FrameCallback, VideoCapture};
