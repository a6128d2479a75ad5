use live_session_types::ParseModeError;
use live_session_utils::audio::DecodeError;
use live_session_utils::backend::BackendError;

/// Failures starting or running a capture source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("media access denied: {0}")]
    PermissionDenied(String),
    #[error("invalid capture mode: {0}")]
    InvalidMode(String),
    #[error("capture already active")]
    AlreadyCapturing,
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture stream failed: {0}")]
    Stream(String),
}

impl From<BackendError> for CaptureError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied(reason) => CaptureError::PermissionDenied(reason),
            BackendError::Unavailable(reason) => CaptureError::DeviceUnavailable(reason),
            BackendError::Stream(reason) => CaptureError::Stream(reason),
        }
    }
}

impl From<ParseModeError> for CaptureError {
    fn from(err: ParseModeError) -> Self {
        CaptureError::InvalidMode(err.0)
    }
}

/// Failures of the bidirectional session channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidUrl(String),
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("connection closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("already connected")]
    AlreadyConnected,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Url(e) => TransportError::InvalidUrl(e.to_string()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            WsError::Protocol(e) => TransportError::Protocol(e.to_string()),
            other => TransportError::Connect(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
