use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use live_session_utils::backend::{VideoBackend, VideoSource, VideoTrack};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::CaptureError;
use crate::types::audio::FRAME_INTERVAL_MS;
use crate::types::CaptureMode;

/// Receives one base64 JPEG (no data-URI prefix) per tick.
pub type FrameCallback = Box<dyn FnMut(String) + Send + 'static>;

const JPEG_QUALITY: u8 = 92;

type SharedTrack = Arc<Mutex<Box<dyn VideoTrack>>>;

enum Phase {
    Idle,
    Starting,
    Active { track: SharedTrack, ticker: JoinHandle<()> },
}

struct Slot {
    generation: u64,
    phase: Phase,
}

/// Camera or screen capture sampled into one JPEG still per interval.
pub struct VideoCapture {
    backend: Arc<dyn VideoBackend>,
    interval: Duration,
    slot: Mutex<Slot>,
}

impl VideoCapture {
    pub fn new(backend: Arc<dyn VideoBackend>) -> Self {
        Self::with_interval(backend, Duration::from_millis(FRAME_INTERVAL_MS))
    }

    pub fn with_interval(backend: Arc<dyn VideoBackend>, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            slot: Mutex::new(Slot {
                generation: 0,
                phase: Phase::Idle,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.slot().phase, Phase::Active { .. })
    }

    pub async fn start(
        &self,
        mode: CaptureMode,
        on_frame: FrameCallback,
    ) -> Result<(), CaptureError> {
        let source = match mode {
            CaptureMode::Camera => VideoSource::Camera,
            CaptureMode::Screen => VideoSource::Screen,
            other => return Err(CaptureError::InvalidMode(other.to_string())),
        };
        let generation = {
            let mut slot = self.slot();
            if !matches!(slot.phase, Phase::Idle) {
                return Err(CaptureError::AlreadyCapturing);
            }
            slot.phase = Phase::Starting;
            slot.generation
        };

        let backend = self.backend.clone();
        let opened = tokio::task::spawn_blocking(move || {
            backend.open(source, source.resolution_hint())
        })
        .await
        .map_err(|e| CaptureError::Stream(e.to_string()))
        .and_then(|opened| opened.map_err(CaptureError::from));

        let mut slot = self.slot();
        if slot.generation != generation {
            if let Ok(mut track) = opened {
                track.stop();
            }
            tracing::debug!("{} capture cancelled before start completed", mode);
            return Ok(());
        }
        match opened {
            Ok(track) => {
                let track: SharedTrack = Arc::new(Mutex::new(track));
                let ticker = tokio::spawn(run_ticker(track.clone(), self.interval, on_frame));
                slot.phase = Phase::Active { track, ticker };
                tracing::info!("{} capture started", mode);
                Ok(())
            }
            Err(e) => {
                slot.phase = Phase::Idle;
                tracing::error!("{} capture failed: {}", mode, e);
                Err(e)
            }
        }
    }

    /// Cancels the frame timer and releases the device. A no-op when idle.
    pub fn stop(&self) {
        let previous = {
            let mut slot = self.slot();
            if matches!(slot.phase, Phase::Idle) {
                return;
            }
            slot.generation += 1;
            std::mem::replace(&mut slot.phase, Phase::Idle)
        };
        if let Phase::Active { track, ticker } = previous {
            ticker.abort();
            track
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .stop();
            tracing::info!("video capture stopped");
        }
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticker(track: SharedTrack, period: Duration, mut on_frame: FrameCallback) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let frame = match track.lock() {
            Ok(mut track) => track.grab(),
            Err(_) => return,
        };
        let Some(frame) = frame.filter(|f| f.width() > 0 && f.height() > 0) else {
            tracing::debug!("no decoded video frame yet, skipping tick");
            continue;
        };
        match encode_jpeg(&frame) {
            Ok(jpeg) => on_frame(jpeg),
            Err(e) => tracing::warn!("failed to encode frame: {}", e),
        }
    }
}

/// JPEG-encodes a frame at its native size and returns bare base64.
pub(crate) fn encode_jpeg(frame: &RgbImage) -> Result<String, CaptureError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(frame)
        .map_err(|e| CaptureError::Stream(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_session_utils::backend::{BackendError, MediaTrack, ResolutionHint};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeTrack {
        grabs: Arc<AtomicUsize>,
        live: Arc<AtomicBool>,
        blank_until: usize,
        panic_on_grab: bool,
    }

    impl MediaTrack for FakeTrack {
        fn stop(&mut self) {
            self.live.store(false, Ordering::SeqCst);
        }

        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
    }

    impl VideoTrack for FakeTrack {
        fn grab(&mut self) -> Option<RgbImage> {
            let n = self.grabs.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_grab {
                panic!("decoder crashed");
            }
            if n < self.blank_until {
                return Some(RgbImage::new(0, 0));
            }
            Some(RgbImage::from_pixel(16, 12, image::Rgb([200, 10, 10])))
        }
    }

    struct FakeCamera {
        grabs: Arc<AtomicUsize>,
        live: Arc<AtomicBool>,
        hints: Arc<Mutex<Vec<ResolutionHint>>>,
        opened: Arc<AtomicUsize>,
        blank_until: usize,
        panic_on_grab: bool,
        delay: Duration,
    }

    impl FakeCamera {
        fn new() -> Self {
            Self {
                grabs: Arc::new(AtomicUsize::new(0)),
                live: Arc::new(AtomicBool::new(false)),
                hints: Arc::new(Mutex::new(Vec::new())),
                opened: Arc::new(AtomicUsize::new(0)),
                blank_until: 0,
                panic_on_grab: false,
                delay: Duration::ZERO,
            }
        }
    }

    impl VideoBackend for FakeCamera {
        fn open(
            &self,
            _source: VideoSource,
            hint: ResolutionHint,
        ) -> Result<Box<dyn VideoTrack>, BackendError> {
            std::thread::sleep(self.delay);
            self.hints.lock().unwrap().push(hint);
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.live.store(true, Ordering::SeqCst);
            Ok(Box::new(FakeTrack {
                grabs: self.grabs.clone(),
                live: self.live.clone(),
                blank_until: self.blank_until,
                panic_on_grab: self.panic_on_grab,
            }))
        }
    }

    fn frames() -> (FrameCallback, Arc<Mutex<Vec<String>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let out = frames.clone();
        (Box::new(move |frame| out.lock().unwrap().push(frame)), frames)
    }

    #[test]
    fn test_encode_jpeg_has_no_data_uri_prefix() {
        let frame = RgbImage::from_pixel(8, 8, image::Rgb([0, 128, 255]));
        let encoded = encode_jpeg(&frame).unwrap();
        assert!(!encoded.starts_with("data:"));
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_rejects_non_video_modes() {
        let capture = VideoCapture::new(Arc::new(FakeCamera::new()));
        for mode in [CaptureMode::Audio, CaptureMode::Text] {
            let err = capture.start(mode, Box::new(|_| {})).await.unwrap_err();
            assert_eq!(err, CaptureError::InvalidMode(mode.to_string()));
        }
        assert!(!capture.is_capturing());
    }

    #[tokio::test]
    async fn test_passes_resolution_hints() {
        let camera = FakeCamera::new();
        let hints = camera.hints.clone();
        let capture = VideoCapture::new(Arc::new(camera));
        capture.start(CaptureMode::Camera, Box::new(|_| {})).await.unwrap();
        capture.stop();
        capture.start(CaptureMode::Screen, Box::new(|_| {})).await.unwrap();
        capture.stop();
        assert_eq!(
            *hints.lock().unwrap(),
            vec![
                ResolutionHint { width: 320, height: 240 },
                ResolutionHint { width: 1920, height: 1080 },
            ]
        );
    }

    #[tokio::test]
    async fn test_emits_frames_and_skips_blank_ticks() {
        let mut camera = FakeCamera::new();
        camera.blank_until = 2;
        let grabs = camera.grabs.clone();
        let capture = VideoCapture::with_interval(Arc::new(camera), Duration::from_millis(10));
        let (callback, frames) = frames();
        capture.start(CaptureMode::Camera, callback).await.unwrap();

        while grabs.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        capture.stop();

        let grabbed = grabs.load(Ordering::SeqCst);
        let delivered = frames.lock().unwrap().len();
        assert!(delivered >= 3);
        assert_eq!(delivered, grabbed - 2);
    }

    #[tokio::test]
    async fn test_stop_cancels_timer_and_track() {
        let camera = FakeCamera::new();
        let grabs = camera.grabs.clone();
        let live = camera.live.clone();
        let capture = VideoCapture::with_interval(Arc::new(camera), Duration::from_millis(10));
        capture.start(CaptureMode::Screen, Box::new(|_| {})).await.unwrap();
        capture.stop();
        capture.stop();
        assert!(!live.load(Ordering::SeqCst));

        let after_stop = grabs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(grabs.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let capture = VideoCapture::new(Arc::new(FakeCamera::new()));
        capture.start(CaptureMode::Camera, Box::new(|_| {})).await.unwrap();
        let err = capture
            .start(CaptureMode::Screen, Box::new(|_| {}))
            .await
            .unwrap_err();
        assert_eq!(err, CaptureError::AlreadyCapturing);
        assert!(capture.is_capturing());
    }

    #[tokio::test]
    async fn test_stop_before_start_completes_leaves_no_track() {
        let mut camera = FakeCamera::new();
        camera.delay = Duration::from_millis(100);
        let opened = camera.opened.clone();
        let live = camera.live.clone();
        let grabs = camera.grabs.clone();
        let capture = Arc::new(VideoCapture::with_interval(
            Arc::new(camera),
            Duration::from_millis(10),
        ));

        let starting = {
            let capture = capture.clone();
            tokio::spawn(async move { capture.start(CaptureMode::Camera, Box::new(|_| {})).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        capture.stop();
        starting.await.unwrap().unwrap();

        assert!(!capture.is_capturing());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(!live.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(grabs.load(Ordering::SeqCst), 0);

        // The cancelled start leaves the source reusable.
        capture.start(CaptureMode::Camera, Box::new(|_| {})).await.unwrap();
        assert!(capture.is_capturing());
    }

    #[tokio::test]
    async fn test_stop_releases_track_after_grab_panics() {
        let mut camera = FakeCamera::new();
        camera.panic_on_grab = true;
        let grabs = camera.grabs.clone();
        let live = camera.live.clone();
        let capture = VideoCapture::with_interval(Arc::new(camera), Duration::from_millis(10));
        capture.start(CaptureMode::Camera, Box::new(|_| {})).await.unwrap();

        while grabs.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        capture.stop();
        assert!(!live.load(Ordering::SeqCst));
    }
}
