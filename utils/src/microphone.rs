use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, StreamConfig};
use rubato::{FastFixedIn, Resampler};

use crate::audio;
use crate::backend::{BackendError, CaptureSpec, MediaTrack, MicrophoneBackend, SampleCallback};
use crate::device;

/// Microphone backed by the default cpal host.
///
/// cpal streams are not `Send`, so each opened track owns a thread that
/// builds, plays and finally drops the stream.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl MicrophoneBackend for CpalMicrophone {
    fn open(
        &self,
        spec: CaptureSpec,
        on_samples: SampleCallback,
    ) -> Result<Box<dyn MediaTrack>, BackendError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), BackendError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let live = Arc::new(AtomicBool::new(false));
        let device_name = self.device_name.clone();
        let thread_live = live.clone();

        let thread = std::thread::Builder::new()
            .name("microphone".into())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), spec, on_samples) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                thread_live.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));
                // Either an explicit stop or the track being dropped.
                let _ = stop_rx.recv();
                drop(stream);
                thread_live.store(false, Ordering::SeqCst);
                tracing::debug!("microphone stream released");
            })
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalInputTrack {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
                live,
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(BackendError::Stream("microphone thread exited".into()))
            }
        }
    }
}

fn build_stream(
    device_name: Option<&str>,
    spec: CaptureSpec,
    on_samples: SampleCallback,
) -> Result<cpal::Stream, BackendError> {
    let input = device::get_or_default_input(device_name)?;
    let default_config = input
        .default_input_config()
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!(
        "input: device={:?}, config={:?}",
        input.name().unwrap_or_default(),
        &config
    );

    let sink = MonoSink::new(&config, spec, on_samples)?;
    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => build_typed::<f32>(&input, &config, sink),
        cpal::SampleFormat::I16 => build_typed::<i16>(&input, &config, sink),
        cpal::SampleFormat::U16 => build_typed::<u16>(&input, &config, sink),
        other => Err(BackendError::Stream(format!(
            "unsupported input sample format {other:?}"
        ))),
    }?;
    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => BackendError::Unavailable(e.to_string()),
        other => BackendError::PermissionDenied(other.to_string()),
    })?;
    Ok(stream)
}

fn build_typed<T>(
    input: &cpal::Device,
    config: &StreamConfig,
    mut sink: MonoSink,
) -> Result<cpal::Stream, BackendError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    input
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let frame: Vec<f32> = data.iter().map(|s| f32::from_sample(*s)).collect();
                sink.push(&frame);
            },
            move |err| tracing::error!("an error occurred on input stream: {}", err),
            None,
        )
        .map_err(map_build_error)
}

fn map_build_error(err: cpal::BuildStreamError) -> BackendError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => BackendError::Unavailable(err.to_string()),
        cpal::BuildStreamError::BackendSpecific { .. } => {
            BackendError::PermissionDenied(err.to_string())
        }
        other => BackendError::Stream(other.to_string()),
    }
}

/// Downmixes interleaved device audio and converts it to the requested rate.
struct MonoSink {
    channels: usize,
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    on_samples: SampleCallback,
}

impl MonoSink {
    fn new(
        config: &StreamConfig,
        spec: CaptureSpec,
        on_samples: SampleCallback,
    ) -> Result<Self, BackendError> {
        let device_rate = config.sample_rate.0;
        let resampler = if device_rate == spec.sample_rate {
            None
        } else {
            let resampler = audio::create_resampler(
                device_rate as f64,
                spec.sample_rate as f64,
                spec.buffer_size,
            )
            .map_err(|e| BackendError::Stream(e.to_string()))?;
            Some(resampler)
        };
        Ok(Self {
            channels: config.channels as usize,
            resampler,
            pending: Vec::new(),
            on_samples,
        })
    }

    fn push(&mut self, interleaved: &[f32]) {
        let mono = audio::downmix(interleaved, self.channels);
        let Some(resampler) = self.resampler.as_mut() else {
            (self.on_samples)(&mono);
            return;
        };
        self.pending.extend_from_slice(&mono);
        while self.pending.len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk], None) {
                Ok(mut out) => {
                    if let Some(channel) = out.pop() {
                        (self.on_samples)(&channel);
                    }
                }
                Err(e) => {
                    tracing::error!("input resampling failed: {}", e);
                    return;
                }
            }
        }
    }
}

struct CpalInputTrack {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    live: Arc<AtomicBool>,
}

impl MediaTrack for CpalInputTrack {
    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("microphone thread panicked");
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for CpalInputTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
