use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use live_session_utils::audio::{self as pcm, DecodeError};
use live_session_utils::backend::SpeakerBackend;
use tokio::task::JoinHandle;

use crate::types::audio::PLAYBACK_SAMPLE_RATE;

struct QueueState {
    pending: VecDeque<Vec<f32>>,
    is_playing: bool,
    generation: u64,
    drain: Option<JoinHandle<()>>,
}

/// Plays inbound audio chunks strictly one after another.
///
/// A single drain task pops the head chunk, waits for the speaker to finish
/// it, then moves on. The task exits when the queue runs dry and the next
/// `enqueue` starts a new one.
pub struct PlaybackQueue {
    sink: Arc<dyn SpeakerBackend>,
    state: Arc<Mutex<QueueState>>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn SpeakerBackend>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(QueueState {
                pending: VecDeque::new(),
                is_playing: false,
                generation: 0,
                drain: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state)
    }

    /// Decodes a base64 PCM16 chunk and queues it, starting playback if idle.
    pub fn enqueue(&self, chunk: &str) -> Result<(), DecodeError> {
        let samples = pcm::decode(chunk)?;
        let mut state = self.state();
        state.pending.push_back(samples);
        if !state.is_playing {
            state.is_playing = true;
            let generation = state.generation;
            state.drain = Some(tokio::spawn(drain(
                self.sink.clone(),
                self.state.clone(),
                generation,
            )));
        }
        Ok(())
    }

    /// Drops pending chunks and silences the chunk in flight.
    pub fn reset(&self) {
        let drain = {
            let mut state = self.state();
            state.pending.clear();
            state.is_playing = false;
            state.generation += 1;
            state.drain.take()
        };
        if let Some(drain) = drain {
            drain.abort();
        }
        self.sink.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing
    }

    /// Chunks queued behind the one currently playing.
    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        if let Some(drain) = self.state().drain.take() {
            drain.abort();
        }
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn drain(sink: Arc<dyn SpeakerBackend>, state: Arc<Mutex<QueueState>>, generation: u64) {
    loop {
        let samples = {
            let mut state = lock(&state);
            if state.generation != generation {
                return;
            }
            match state.pending.pop_front() {
                Some(samples) => samples,
                None => {
                    state.is_playing = false;
                    state.drain = None;
                    return;
                }
            }
        };
        if let Err(e) = sink.play(samples, PLAYBACK_SAMPLE_RATE).await {
            tracing::warn!("failed to play chunk: {}", e);
        }
    }
}
