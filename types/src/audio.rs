mod consts;

pub use consts::*;

/// Audio data encoded as base64 PCM16 little-endian.
pub type Base64EncodedAudioBytes = String;

/// A JPEG still encoded as base64, without any data-URI prefix.
pub type Base64EncodedImage = String;
