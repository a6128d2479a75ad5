use std::sync::Arc;
use std::time::Duration;

use live_session_utils::backend::{MicrophoneBackend, SpeakerBackend, VideoBackend};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::capture::{AudioCapture, ChunkCallback, FrameCallback, VideoCapture};
use crate::client::ReconnectPolicy;
use crate::error::{CaptureError, Error, TransportError};
use crate::playback::PlaybackQueue;
use crate::transport::{LinkState, Transport, TransportEvent};
use crate::types::{CaptureMode, InboundMessage, OutboundMessage, SessionConfig};

const TRANSPORT_EVENT_CAPACITY: usize = 256;
const COMMAND_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Connecting,
    Streaming,
}

/// What the controller reports to whoever drives the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    /// The transport dropped; captures have already been stopped.
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    /// Retry attempts are exhausted; no further reconnect is scheduled.
    GaveUp { attempts: u32 },
    StateChanged(ControllerState),
    Text(String),
    TurnComplete,
    /// An `error` frame from the server. The session stays open.
    ServerError(String),
    /// A frame of a kind the controller does not act on, passed through as-is.
    Unknown(Value),
    Error(String),
}

/// Device access used by the capture sources and playback.
pub struct MediaBackends {
    pub microphone: Arc<dyn MicrophoneBackend>,
    /// Camera and screen sharing. Without it only `audio` and `text` modes work.
    pub video: Option<Arc<dyn VideoBackend>>,
    pub speaker: Arc<dyn SpeakerBackend>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(CaptureMode),
    Stop,
    SendText(String),
    UpdateConfig(SessionConfig),
    Shutdown,
}

/// Cloneable front end to a controller running in [`SessionController::run`].
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
}

impl ControllerHandle {
    async fn submit(&self, command: Command) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn start(&self, mode: CaptureMode) -> Result<(), TransportError> {
        self.submit(Command::Start(mode)).await
    }

    pub async fn stop(&self) -> Result<(), TransportError> {
        self.submit(Command::Stop).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.submit(Command::SendText(text.into())).await
    }

    pub async fn update_config(&self, config: SessionConfig) -> Result<(), TransportError> {
        self.submit(Command::UpdateConfig(config)).await
    }

    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.submit(Command::Shutdown).await
    }
}

/// Owns the transport, the capture sources and playback for one session.
///
/// All lifecycle changes go through `&mut self`, so there is a single writer
/// for capture state. Transport events arrive on an internal channel and are
/// handled strictly in arrival order.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    session: SessionConfig,
    reconnect: ReconnectPolicy,
    audio: AudioCapture,
    video: Option<VideoCapture>,
    playback: PlaybackQueue,
    state: ControllerState,
    mode: Option<CaptureMode>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    observer: mpsc::UnboundedSender<SessionEvent>,
    reconnect_at: Option<Instant>,
    attempts: u32,
    shutting_down: bool,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: SessionConfig,
        reconnect: ReconnectPolicy,
        backends: MediaBackends,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let (observer, observed) = mpsc::unbounded_channel();
        let controller = Self {
            transport,
            session,
            reconnect,
            audio: AudioCapture::new(backends.microphone),
            video: backends.video.map(VideoCapture::new),
            playback: PlaybackQueue::new(backends.speaker),
            state: ControllerState::Idle,
            mode: None,
            events_tx,
            events_rx,
            observer,
            reconnect_at: None,
            attempts: 0,
            shutting_down: false,
        };
        (controller, observed)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.transport.state() == LinkState::Open
    }

    /// When the next reconnect attempt is due, if one is scheduled.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    /// Used for the next connect; the live session keeps the config it opened with.
    pub fn set_session_config(&mut self, session: SessionConfig) {
        self.session = session;
    }

    fn notify(&self, event: SessionEvent) {
        // A dropped observer only means nobody is watching.
        let _ = self.observer.send(event);
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            tracing::debug!("controller state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.notify(SessionEvent::StateChanged(state));
        }
    }

    /// Opens a session with a snapshot of the current config. A failure
    /// schedules a retry per the reconnect policy.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        self.set_state(ControllerState::Connecting);
        let snapshot = self.session.snapshot(self.mode);
        match self
            .transport
            .connect(snapshot, self.events_tx.clone())
            .await
        {
            Ok(()) => {
                self.attempts = 0;
                self.reconnect_at = None;
                self.set_state(ControllerState::Idle);
                tracing::info!("session connected");
                self.notify(SessionEvent::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::error!("connect failed: {}", e);
                self.set_state(ControllerState::Idle);
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.shutting_down {
            return;
        }
        self.attempts += 1;
        match self.reconnect.delay_for(self.attempts) {
            Some(delay) => {
                tracing::info!("reconnecting in {:?} (attempt {})", delay, self.attempts);
                self.reconnect_at = Some(Instant::now() + delay);
                self.notify(SessionEvent::Reconnecting {
                    attempt: self.attempts,
                    delay,
                });
            }
            None => {
                let attempts = self.attempts - 1;
                tracing::warn!("giving up after {} reconnect attempts", attempts);
                self.reconnect_at = None;
                self.notify(SessionEvent::GaveUp { attempts });
            }
        }
    }

    async fn reconnect_now(&mut self) {
        self.reconnect_at = None;
        if self.is_connected() {
            return;
        }
        // Failures are logged and rescheduled by `connect`.
        let _ = self.connect().await;
    }

    /// Starts streaming in `mode`, connecting first if needed. Switching to a
    /// different mode stops the current captures first.
    pub async fn start_stream(&mut self, mode: CaptureMode) -> Result<(), Error> {
        if self.state == ControllerState::Streaming {
            if self.mode == Some(mode) {
                return Ok(());
            }
            self.stop_stream();
        }

        let previous_mode = self.mode.replace(mode);
        if !self.is_connected() {
            if let Err(e) = self.connect().await {
                self.mode = previous_mode;
                return Err(e.into());
            }
        }

        if let Err(e) = self.start_captures(mode).await {
            tracing::error!("failed to start {} stream: {}", mode, e);
            self.mode = None;
            return Err(e.into());
        }
        self.set_state(ControllerState::Streaming);
        tracing::info!("streaming {}", mode);
        Ok(())
    }

    async fn start_captures(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        if mode.captures_video() && self.video.is_none() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "no video backend for {mode}"
            )));
        }
        if mode.captures_audio() {
            let transport = self.transport.clone();
            let on_chunk: ChunkCallback =
                Box::new(move |chunk: String| transport.send(OutboundMessage::audio(chunk)));
            self.audio.start(on_chunk).await?;
        }
        if let Some(video) = self.video.as_ref().filter(|_| mode.captures_video()) {
            let transport = self.transport.clone();
            let on_frame: FrameCallback =
                Box::new(move |frame: String| transport.send(OutboundMessage::image(frame)));
            if let Err(e) = video.start(mode, on_frame).await {
                self.audio.stop();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stops captures and playback. The transport stays connected.
    pub fn stop_stream(&mut self) {
        self.release_media();
        if self.state == ControllerState::Streaming {
            self.set_state(ControllerState::Idle);
        }
        self.mode = None;
    }

    fn release_media(&mut self) {
        self.audio.stop();
        if let Some(video) = &self.video {
            video.stop();
        }
        self.playback.reset();
    }

    /// Sends a text turn regardless of capture state.
    pub fn send_text(&self, text: &str) {
        self.transport.send(OutboundMessage::text(text));
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => self.handle_message(message),
            TransportEvent::Error(e) => {
                tracing::error!("transport error: {}", e);
                self.notify(SessionEvent::Error(e.to_string()));
            }
            TransportEvent::Closed => {
                if self.is_connected() {
                    tracing::debug!("ignoring close of a superseded session");
                    return;
                }
                tracing::warn!("session closed");
                self.release_media();
                self.mode = None;
                self.set_state(ControllerState::Idle);
                self.notify(SessionEvent::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    fn handle_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Audio { data } => {
                if let Err(e) = self.playback.enqueue(&data) {
                    tracing::warn!("dropping undecodable audio chunk: {}", e);
                    self.notify(SessionEvent::Error(e.to_string()));
                }
            }
            InboundMessage::Text { text } => self.notify(SessionEvent::Text(text)),
            InboundMessage::TurnComplete => self.notify(SessionEvent::TurnComplete),
            InboundMessage::Error { message } => {
                tracing::error!("server error: {}", message);
                self.notify(SessionEvent::ServerError(message));
            }
            InboundMessage::Other(value) => {
                tracing::debug!("unhandled message: {}", value);
                self.notify(SessionEvent::Unknown(value));
            }
        }
    }

    /// Stops everything and closes the transport without scheduling a retry.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
        self.reconnect_at = None;
        self.stop_stream();
        self.transport.disconnect();
        self.set_state(ControllerState::Idle);
        tracing::info!("session shut down");
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start(mode) => {
                if let Err(e) = self.start_stream(mode).await {
                    self.notify(SessionEvent::Error(e.to_string()));
                }
            }
            Command::Stop => self.stop_stream(),
            Command::SendText(text) => self.send_text(&text),
            Command::UpdateConfig(session) => self.set_session_config(session),
            Command::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Connects, then serves commands, transport events and reconnect timers
    /// until shut down or every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        if let Err(e) = self.connect().await {
            self.notify(SessionEvent::Error(e.to_string()));
        }
        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown();
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = self.events_rx.recv() => self.handle_transport_event(event),
                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect_now().await;
                }
            }
        }
    }

    /// Runs the controller on its own task.
    pub fn spawn(self) -> (ControllerHandle, tokio::task::JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(self.run(commands_rx));
        (
            ControllerHandle {
                commands: commands_tx,
            },
            task,
        )
    }
}
