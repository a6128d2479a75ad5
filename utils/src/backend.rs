//! Seams between the capture/playback pipelines and the platform media APIs.
//!
//! The pipelines own chunking, encoding and scheduling; a backend only has to
//! acquire a device and move raw samples or frames.

use async_trait::async_trait;
use image::RgbImage;

/// Receives mono samples, normalized to [-1.0, 1.0], at the requested rate.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The platform refused access to the device.
    #[error("access denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("stream failure: {0}")]
    Stream(String),
}

/// What a microphone backend must deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSpec {
    pub sample_rate: u32,
    /// Preferred processing buffer in frames; a hint to the device.
    pub buffer_size: usize,
}

/// A live device stream. Implementations release the device on `stop` and
/// again on drop, and `stop` must be safe to call repeatedly.
pub trait MediaTrack: Send {
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

pub trait MicrophoneBackend: Send + Sync {
    /// Acquires the microphone and starts calling `on_samples`. May block
    /// while the platform prompts for access.
    fn open(
        &self,
        spec: CaptureSpec,
        on_samples: SampleCallback,
    ) -> Result<Box<dyn MediaTrack>, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    Camera,
    Screen,
}

/// Preferred frame size. Backends may negotiate something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionHint {
    pub width: u32,
    pub height: u32,
}

impl VideoSource {
    pub fn resolution_hint(&self) -> ResolutionHint {
        match self {
            VideoSource::Camera => ResolutionHint {
                width: 320,
                height: 240,
            },
            VideoSource::Screen => ResolutionHint {
                width: 1920,
                height: 1080,
            },
        }
    }
}

pub trait VideoTrack: MediaTrack {
    /// The most recent decoded frame at its native size, or `None` before the
    /// first frame has arrived.
    fn grab(&mut self) -> Option<RgbImage>;
}

pub trait VideoBackend: Send + Sync {
    fn open(
        &self,
        source: VideoSource,
        hint: ResolutionHint,
    ) -> Result<Box<dyn VideoTrack>, BackendError>;
}

#[async_trait]
pub trait SpeakerBackend: Send + Sync {
    /// Plays one mono buffer and resolves once it has finished playing.
    async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), BackendError>;

    /// Silences anything queued or playing.
    fn stop(&self);
}
