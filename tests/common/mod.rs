#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use live_session::utils::backend::{
    BackendError, CaptureSpec, MediaTrack, MicrophoneBackend, SampleCallback, SpeakerBackend,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

/// One accepted client connection on the fake bridge.
pub struct Peer {
    pub path: String,
    pub frames: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Peer {
    pub fn send(&self, frame: Value) {
        let _ = self.outbound.send(Message::Text(frame.to_string()));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.outbound.send(Message::Text(text.to_string()));
    }

    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }

    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("peer connection ended")
    }

    /// Frames already received, without waiting.
    pub fn drain_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Minimal stand-in for the session bridge: accepts WebSocket clients on
/// `127.0.0.1` and hands each connection to the test as a [`Peer`].
pub struct Bridge {
    pub url: String,
    peers: mpsc::UnboundedReceiver<Peer>,
}

impl Bridge {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (peers_tx, peers) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let peers_tx = peers_tx.clone();
                tokio::spawn(async move {
                    let (path_tx, path_rx) = std::sync::mpsc::channel();
                    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                        let _ = path_tx.send(request.uri().path().to_string());
                        Ok(response)
                    };
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    let path = path_rx.recv().unwrap_or_default();
                    let (mut write, mut read) = ws.split();
                    let (frames_tx, frames) = mpsc::unbounded_channel();
                    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
                    let _ = peers_tx.send(Peer {
                        path,
                        frames,
                        outbound,
                    });
                    tokio::spawn(async move {
                        while let Some(message) = outbound_rx.recv().await {
                            let closing = matches!(message, Message::Close(_));
                            if write.send(message).await.is_err() || closing {
                                break;
                            }
                        }
                    });
                    while let Some(Ok(message)) = read.next().await {
                        if let Message::Text(text) = message {
                            if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                                let _ = frames_tx.send(frame);
                            }
                        }
                    }
                });
            }
        });
        Self { url, peers }
    }

    pub async fn accept(&mut self) -> Peer {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("timed out waiting for a client")
            .expect("bridge stopped")
    }
}

#[derive(Default)]
pub struct MicCounters {
    pub opened: AtomicUsize,
    pub stopped: AtomicUsize,
}

/// Microphone that feeds quiet samples from a thread until stopped.
pub struct FakeMic {
    pub counters: Arc<MicCounters>,
}

impl FakeMic {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(MicCounters::default()),
        }
    }
}

struct FakeMicTrack {
    live: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    counters: Arc<MicCounters>,
}

impl MediaTrack for FakeMicTrack {
    fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for FakeMicTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MicrophoneBackend for FakeMic {
    fn open(
        &self,
        spec: CaptureSpec,
        mut on_samples: SampleCallback,
    ) -> Result<Box<dyn MediaTrack>, BackendError> {
        assert_eq!(spec.sample_rate, 16_000);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let live = Arc::new(AtomicBool::new(true));
        let feeding = live.clone();
        let thread = std::thread::spawn(move || {
            while feeding.load(Ordering::SeqCst) {
                on_samples(&[0.125; 256]);
                std::thread::sleep(Duration::from_millis(4));
            }
        });
        Ok(Box::new(FakeMicTrack {
            live,
            thread: Some(thread),
            counters: self.counters.clone(),
        }))
    }
}

/// Speaker that finishes every buffer immediately and logs its length.
#[derive(Default)]
pub struct FakeSpeaker {
    pub played: Mutex<Vec<usize>>,
    pub stops: AtomicUsize,
}

#[async_trait]
impl SpeakerBackend for FakeSpeaker {
    async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), BackendError> {
        assert_eq!(sample_rate, 24_000);
        self.played.lock().unwrap().push(samples.len());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Polls `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
