use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SizedSample, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd};
use rubato::{FastFixedIn, Resampler};
use tokio::sync::Notify;

use crate::audio;
use crate::backend::{BackendError, SpeakerBackend};
use crate::device;

/// Seconds of device audio the ring buffer can hold.
const OUTPUT_BUFFER_SECS: usize = 10;
/// Slack allowed past a buffer's nominal duration before `play` gives up waiting.
const PLAYBACK_GRACE: Duration = Duration::from_secs(1);
/// Input frames per resampler pass.
const RESAMPLE_CHUNK: usize = 256;

/// State shared between the async side and the cpal output callback.
struct Shared {
    producer: Mutex<HeapProd<f32>>,
    consumer: Arc<Mutex<HeapCons<f32>>>,
    queued: AtomicU64,
    played: Arc<AtomicU64>,
    progress: Arc<Notify>,
}

/// Speaker backed by a single persistent cpal output stream.
///
/// Buffers are resampled to the device rate and pushed into a ring buffer
/// drained by the output callback. `play` resolves once the callback has
/// consumed every sample of the buffer.
pub struct CpalSpeaker {
    shared: Shared,
    device_rate: u32,
    resampler: Mutex<Option<OutputResampler>>,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalSpeaker {
    pub fn new(device_name: Option<String>) -> Result<Self, BackendError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let played = Arc::new(AtomicU64::new(0));
        let progress = Arc::new(Notify::new());
        let thread_played = played.clone();
        let thread_progress = progress.clone();

        let thread = std::thread::Builder::new()
            .name("speaker".into())
            .spawn(move || {
                let opened = open_output(device_name.as_deref(), thread_played, thread_progress);
                let stream = match opened {
                    Ok((stream, rate, producer, consumer)) => {
                        let _ = ready_tx.send(Ok((rate, producer, consumer)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("speaker stream released");
            })
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        let (device_rate, producer, consumer) = match ready_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(BackendError::Stream("speaker thread exited".into()));
            }
        };

        Ok(Self {
            shared: Shared {
                producer: Mutex::new(producer),
                consumer,
                queued: AtomicU64::new(0),
                played,
                progress,
            },
            device_rate,
            resampler: Mutex::new(None),
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    fn resample(&self, samples: Vec<f32>, sample_rate: u32) -> Result<Vec<f32>, BackendError> {
        if sample_rate == self.device_rate {
            return Ok(samples);
        }
        let mut slot = self
            .resampler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let resampler = match slot.take() {
            Some(resampler) if resampler.input_rate == sample_rate => slot.insert(resampler),
            _ => slot.insert(OutputResampler::new(sample_rate, self.device_rate)?),
        };
        resampler.process(&samples)
    }

    fn push(&self, samples: &[f32]) -> usize {
        let Ok(mut producer) = self.shared.producer.lock() else {
            return 0;
        };
        let pushed = producer.push_slice(samples);
        self.shared.queued.fetch_add(pushed as u64, Ordering::SeqCst);
        pushed
    }
}

/// Converts consecutive buffers at one input rate to the device rate.
///
/// The filter state and any partial chunk carry over between buffers, so a
/// stream split into arbitrary buffers resamples as one continuous signal.
/// A partial tail is held until the next buffer arrives.
struct OutputResampler {
    input_rate: u32,
    resampler: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl OutputResampler {
    fn new(input_rate: u32, device_rate: u32) -> Result<Self, BackendError> {
        let resampler =
            audio::create_resampler(input_rate as f64, device_rate as f64, RESAMPLE_CHUNK)
                .map_err(|e| BackendError::Stream(e.to_string()))?;
        Ok(Self {
            input_rate,
            resampler,
            pending: Vec::new(),
        })
    }

    fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, BackendError> {
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        while self.pending.len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let mut channels = self
                .resampler
                .process(&[chunk], None)
                .map_err(|e| BackendError::Stream(e.to_string()))?;
            if let Some(channel) = channels.pop() {
                out.extend(channel);
            }
        }
        Ok(out)
    }
}

type Opened = (cpal::Stream, u32, HeapProd<f32>, Arc<Mutex<HeapCons<f32>>>);

fn open_output(
    device_name: Option<&str>,
    played: Arc<AtomicU64>,
    progress: Arc<Notify>,
) -> Result<Opened, BackendError> {
    let output = device::get_or_default_output(device_name)?;
    let default_config = output
        .default_output_config()
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!(
        "output: device={:?}, config={:?}",
        output.name().unwrap_or_default(),
        &config
    );

    let rate = config.sample_rate.0;
    let (producer, consumer) = audio::shared_buffer(rate as usize * OUTPUT_BUFFER_SECS).split();
    let consumer = Arc::new(Mutex::new(consumer));
    let drain = Drain {
        channels: config.channels as usize,
        consumer: consumer.clone(),
        played,
        progress,
    };
    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => build_typed::<f32>(&output, &config, drain),
        cpal::SampleFormat::I16 => build_typed::<i16>(&output, &config, drain),
        cpal::SampleFormat::U16 => build_typed::<u16>(&output, &config, drain),
        other => Err(BackendError::Stream(format!(
            "unsupported output sample format {other:?}"
        ))),
    }?;
    stream
        .play()
        .map_err(|e| BackendError::Stream(e.to_string()))?;
    Ok((stream, rate, producer, consumer))
}

fn build_typed<T>(
    output: &cpal::Device,
    config: &StreamConfig,
    drain: Drain,
) -> Result<cpal::Stream, BackendError>
where
    T: SizedSample + FromSample<f32>,
{
    output
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| drain.fill(data),
            move |err| tracing::error!("an error occurred on output stream: {}", err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => BackendError::Unavailable(e.to_string()),
            other => BackendError::Stream(other.to_string()),
        })
}

/// Output callback state: copies each mono sample to every channel.
struct Drain {
    channels: usize,
    consumer: Arc<Mutex<HeapCons<f32>>>,
    played: Arc<AtomicU64>,
    progress: Arc<Notify>,
}

impl Drain {
    fn fill<T: SizedSample + FromSample<f32>>(&self, data: &mut [T]) {
        let silence = T::from_sample(0.0f32);
        // Never block the audio thread; a contended lock plays silence.
        let Ok(mut consumer) = self.consumer.try_lock() else {
            data.fill(silence);
            return;
        };
        let mut popped = 0u64;
        for frame in data.chunks_mut(self.channels.max(1)) {
            let sample = match consumer.try_pop() {
                Some(sample) => {
                    popped += 1;
                    T::from_sample(sample)
                }
                None => silence,
            };
            frame.fill(sample);
        }
        if popped > 0 {
            self.played.fetch_add(popped, Ordering::SeqCst);
            self.progress.notify_waiters();
        }
    }
}

#[async_trait]
impl SpeakerBackend for CpalSpeaker {
    async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), BackendError> {
        if samples.is_empty() {
            return Ok(());
        }
        let samples = self.resample(samples, sample_rate)?;
        let budget = Duration::from_secs_f64(samples.len() as f64 / self.device_rate as f64)
            + PLAYBACK_GRACE;
        let deadline = tokio::time::Instant::now() + budget;

        let mut remaining = samples.as_slice();
        while !remaining.is_empty() {
            let notified = self.shared.progress.notified();
            let pushed = self.push(remaining);
            remaining = &remaining[pushed..];
            if pushed == 0 && tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(BackendError::Stream("output buffer stalled".into()));
            }
        }

        let target = self.shared.queued.load(Ordering::SeqCst);
        loop {
            let notified = self.shared.progress.notified();
            if self.shared.played.load(Ordering::SeqCst) >= target {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::warn!("playback did not finish within {:?}", budget);
                return Ok(());
            }
        }
    }

    fn stop(&self) {
        self.resampler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Ok(mut consumer) = self.shared.consumer.lock() {
            let cleared = consumer.clear();
            self.shared.played.fetch_add(cleared as u64, Ordering::SeqCst);
        }
        self.shared.progress.notify_waiters();
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        if let Ok(mut shutdown) = self.shutdown.lock() {
            shutdown.take();
        }
        if let Ok(mut thread) = self.thread.lock() {
            if let Some(thread) = thread.take() {
                let _ = thread.join();
            }
        }
    }
}
