use std::sync::{Arc, Mutex, MutexGuard};

use live_session_utils::audio as pcm;
use live_session_utils::backend::{CaptureSpec, MediaTrack, MicrophoneBackend};

use crate::error::CaptureError;
use crate::types::audio::{CAPTURE_BUFFER_SIZE, CAPTURE_SAMPLE_RATE};

/// Receives one base64 PCM16 chunk per processing buffer.
pub type ChunkCallback = Box<dyn FnMut(String) + Send + 'static>;

enum Phase {
    Idle,
    Starting,
    Active(Box<dyn MediaTrack>),
}

struct Slot {
    generation: u64,
    phase: Phase,
}

/// Microphone capture emitting fixed 512-sample mono chunks at 16 kHz.
///
/// At most one microphone stream is open per instance. `stop` may be called
/// at any time, including while `start` is still waiting on the device.
pub struct AudioCapture {
    backend: Arc<dyn MicrophoneBackend>,
    slot: Arc<Mutex<Slot>>,
}

impl AudioCapture {
    pub fn new(backend: Arc<dyn MicrophoneBackend>) -> Self {
        Self {
            backend,
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                phase: Phase::Idle,
            })),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.slot().phase, Phase::Active(_))
    }

    pub async fn start(&self, on_chunk: ChunkCallback) -> Result<(), CaptureError> {
        let generation = {
            let mut slot = self.slot();
            if !matches!(slot.phase, Phase::Idle) {
                return Err(CaptureError::AlreadyCapturing);
            }
            slot.phase = Phase::Starting;
            slot.generation
        };

        let spec = CaptureSpec {
            sample_rate: CAPTURE_SAMPLE_RATE,
            buffer_size: CAPTURE_BUFFER_SIZE,
        };
        let mut chunker = Chunker::new(CAPTURE_BUFFER_SIZE, on_chunk);
        let backend = self.backend.clone();
        let opened = tokio::task::spawn_blocking(move || {
            backend.open(spec, Box::new(move |samples: &[f32]| chunker.push(samples)))
        })
        .await
        .map_err(|e| CaptureError::Stream(e.to_string()))
        .and_then(|opened| opened.map_err(CaptureError::from));

        let mut slot = self.slot();
        if slot.generation != generation {
            // Stopped while the device was being acquired.
            if let Ok(mut track) = opened {
                track.stop();
            }
            tracing::debug!("microphone capture cancelled before start completed");
            return Ok(());
        }
        match opened {
            Ok(track) => {
                slot.phase = Phase::Active(track);
                tracing::info!("microphone capture started");
                Ok(())
            }
            Err(e) => {
                slot.phase = Phase::Idle;
                tracing::error!("microphone capture failed: {}", e);
                Err(e)
            }
        }
    }

    /// Releases the microphone. A no-op when idle.
    pub fn stop(&self) {
        let previous = {
            let mut slot = self.slot();
            if matches!(slot.phase, Phase::Idle) {
                return;
            }
            slot.generation += 1;
            std::mem::replace(&mut slot.phase, Phase::Idle)
        };
        if let Phase::Active(mut track) = previous {
            track.stop();
            tracing::info!("microphone capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Regroups arbitrarily sized sample runs into fixed-size encoded chunks.
struct Chunker {
    size: usize,
    pending: Vec<f32>,
    on_chunk: ChunkCallback,
}

impl Chunker {
    fn new(size: usize, on_chunk: ChunkCallback) -> Self {
        Self {
            size,
            pending: Vec::with_capacity(size),
            on_chunk,
        }
    }

    fn push(&mut self, samples: &[f32]) {
        let mut samples = samples;
        while !samples.is_empty() {
            let take = (self.size - self.pending.len()).min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];
            if self.pending.len() == self.size {
                (self.on_chunk)(pcm::encode(&self.pending));
                self.pending.clear();
            }
        }
    }
}
