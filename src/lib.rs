mod capture;
mod client;
mod controller;
mod error;
mod playback;
mod transport;

pub use live_session_types as types;
pub use live_session_utils as utils;
pub use live_session_utils::audio as pcm;

pub use capture::{AudioCapture, ChunkCallback, FrameCallback, VideoCapture};
pub use client::{
    session_url, Client, ClientConfig, ClientConfigBuilder, ClientStats, ReconnectPolicy,
};
pub use controller::{
    Command, ControllerHandle, ControllerState, MediaBackends, SessionController, SessionEvent,
};
pub use error::{CaptureError, ConfigError, Error, Result, TransportError};
pub use playback::PlaybackQueue;
pub use transport::{LinkState, Transport, TransportEvent};
