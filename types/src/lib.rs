pub mod audio;
pub mod events;
pub mod mode;
pub mod session;

pub use events::{InboundMessage, OutboundMessage};
pub use mode::{CaptureMode, ParseModeError};
pub use session::{SessionConfig, SessionConfigurator, StructuredOutput};
