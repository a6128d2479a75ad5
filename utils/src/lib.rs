pub mod audio;
pub mod backend;
#[cfg(feature = "camera")]
pub mod camera;
pub mod device;
pub mod microphone;
pub mod speaker;
