use std::fmt;
use std::str::FromStr;

/// What the user asked to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Audio,
    Camera,
    Screen,
    Text,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Audio => "audio",
            CaptureMode::Camera => "camera",
            CaptureMode::Screen => "screen",
            CaptureMode::Text => "text",
        }
    }

    /// Whether this mode holds the microphone open.
    pub fn captures_audio(&self) -> bool {
        !matches!(self, CaptureMode::Text)
    }

    /// Whether this mode samples a video source.
    pub fn captures_video(&self) -> bool {
        matches!(self, CaptureMode::Camera | CaptureMode::Screen)
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capture mode {0:?}, expected one of audio, camera, screen, text")]
pub struct ParseModeError(pub String);

impl FromStr for CaptureMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(CaptureMode::Audio),
            "camera" => Ok(CaptureMode::Camera),
            "screen" => Ok(CaptureMode::Screen),
            "text" => Ok(CaptureMode::Text),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}
