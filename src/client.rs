use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::client::stats::Stats;
use crate::error::TransportError;
use crate::transport::{LinkState, Transport, TransportEvent};
use crate::types::{InboundMessage, OutboundMessage, SessionConfig};

mod config;
mod consts;
mod stats;
mod utils;

pub use config::{ClientConfig, ClientConfigBuilder, ReconnectPolicy};
pub use stats::Stats as ClientStats;
pub use utils::session_url;

enum Command {
    Frame(OutboundMessage),
    Close,
}

struct Link {
    state: LinkState,
    /// Bumped by every connect and disconnect so tasks of an older session
    /// never touch the current one.
    generation: u64,
    outbound: Option<mpsc::Sender<Command>>,
    client_id: Option<String>,
}

/// WebSocket transport to the session bridge.
///
/// Each `connect` opens `{base_url}/ws/{uuid}` with a fresh client id, writes
/// the config frame, then hands the socket halves to a send task and a
/// receive task.
pub struct Client {
    config: ClientConfig,
    link: Arc<Mutex<Link>>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            link: Arc::new(Mutex::new(Link {
                state: LinkState::Closed,
                generation: 0,
                outbound: None,
                client_id: None,
            })),
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Identifier of the current or most recent session.
    pub fn client_id(&self) -> Option<String> {
        lock(&self.link).client_id.clone()
    }

    pub fn stats(&self) -> Stats {
        lock(&self.stats).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks the link closed if `generation` still owns it.
fn release(link: &Mutex<Link>, generation: u64) {
    let mut link = lock(link);
    if link.generation == generation {
        link.state = LinkState::Closed;
        link.outbound = None;
    }
}

#[async_trait]
impl Transport for Client {
    async fn connect(
        &self,
        session: SessionConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let generation = {
            let mut link = lock(&self.link);
            if link.state != LinkState::Closed {
                return Err(TransportError::AlreadyConnected);
            }
            link.state = LinkState::Connecting;
            link.generation += 1;
            link.generation
        };

        let client_id = uuid::Uuid::new_v4().to_string();
        let request = match utils::build_request(&self.config, &client_id) {
            Ok(request) => request,
            Err(e) => {
                release(&self.link, generation);
                return Err(e);
            }
        };
        tracing::info!("connecting to {}", request.uri());

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::error!("failed to connect: {}", e);
                release(&self.link, generation);
                return Err(TransportError::Connect(e.to_string()));
            }
        };
        let (mut write, mut read) = ws_stream.split();

        // The config frame goes out before the link is marked open, so no
        // other frame can be queued ahead of it.
        let config_frame = OutboundMessage::config(session);
        let sent = match serde_json::to_string(&config_frame) {
            Ok(text) => write
                .send(Message::Text(text))
                .await
                .map_err(|e| TransportError::Send(e.to_string())),
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        };
        if let Err(e) = sent {
            tracing::error!("failed to send config frame: {}", e);
            release(&self.link, generation);
            return Err(e);
        }
        lock(&self.stats).record_sent(config_frame.kind());

        let (c_tx, mut c_rx) = mpsc::channel::<Command>(self.config.outbound_capacity());
        let opened = {
            let mut link = lock(&self.link);
            if link.generation == generation {
                link.state = LinkState::Open;
                link.outbound = Some(c_tx);
                link.client_id = Some(client_id.clone());
                true
            } else {
                false
            }
        };
        if !opened {
            // Disconnected while the handshake was in flight.
            let _ = write.close().await;
            return Err(TransportError::Closed);
        }
        lock(&self.stats).record_session();
        tracing::info!("session {} open", client_id);

        let stats = self.stats.clone();
        let send_events = events.clone();
        tokio::spawn(async move {
            while let Some(command) = c_rx.recv().await {
                let message = match command {
                    Command::Frame(message) => message,
                    Command::Close => break,
                };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize {} frame: {}", message.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    tracing::error!("failed to send message: {}", e);
                    let _ = send_events
                        .send(TransportEvent::Error(TransportError::Send(e.to_string())))
                        .await;
                    break;
                }
                lock(&stats).record_sent(message.kind());
            }
            if let Err(e) = write.close().await {
                tracing::debug!("close handshake: {}", e);
            }
        });

        let link = self.link.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = events.send(TransportEvent::Error(e.into())).await;
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match InboundMessage::from_json(&text) {
                        Ok(inbound) => {
                            tracing::debug!("received message: {}", inbound.kind());
                            lock(&stats).record_received();
                            if events.send(TransportEvent::Message(inbound)).await.is_err() {
                                tracing::debug!("event receiver dropped");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to parse frame: {}, text=> {:?}", e, text);
                            let error = TransportError::Protocol(e.to_string());
                            let _ = events.send(TransportEvent::Error(error)).await;
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break;
                    }
                    _ => {}
                }
            }
            release(&link, generation);
            let _ = events.send(TransportEvent::Closed).await;
        });

        Ok(())
    }

    fn send(&self, message: OutboundMessage) {
        let link = lock(&self.link);
        let open = link.state == LinkState::Open;
        let Some(outbound) = link.outbound.as_ref().filter(|_| open) else {
            tracing::debug!("dropping {} frame: link not open", message.kind());
            return;
        };
        if let Err(e) = outbound.try_send(Command::Frame(message)) {
            match e {
                mpsc::error::TrySendError::Full(Command::Frame(message)) => {
                    tracing::warn!("outbound queue full, dropping {} frame", message.kind());
                }
                _ => tracing::debug!("outbound queue closed"),
            }
        }
    }

    fn state(&self) -> LinkState {
        lock(&self.link).state
    }

    fn disconnect(&self) {
        let mut link = lock(&self.link);
        if link.state == LinkState::Closed {
            return;
        }
        link.state = LinkState::Closed;
        link.generation += 1;
        if let Some(outbound) = link.outbound.take() {
            if outbound.try_send(Command::Close).is_err() {
                // Dropping the sender ends the send task, which closes the socket.
                tracing::debug!("outbound queue busy, closing on drain");
            }
        }
        tracing::info!("disconnecting");
    }
}
