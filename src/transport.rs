use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::{InboundMessage, OutboundMessage, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
}

/// Everything a transport reports after `connect` resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One inbound frame, in arrival order. Unknown kinds arrive as
    /// [`InboundMessage::Other`].
    Message(InboundMessage),
    Error(TransportError),
    /// The channel is gone, whether closed locally, by the peer or by a fault.
    Closed,
}

/// The single bidirectional channel of a session.
///
/// Reconnection is not the transport's concern: it reports `Closed` and
/// leaves retry policy to the caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a fresh session and sends `config` as the first frame before
    /// resolving. Events for this session are delivered on `events`.
    async fn connect(
        &self,
        config: SessionConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError>;

    /// Queues a frame. Silently dropped unless the link is open.
    fn send(&self, message: OutboundMessage);

    fn state(&self) -> LinkState;

    /// Closes the link if open. Safe to call repeatedly.
    fn disconnect(&self);
}
