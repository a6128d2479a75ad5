use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

use crate::backend::{
    BackendError, MediaTrack, ResolutionHint, VideoBackend, VideoSource, VideoTrack,
};

const REQUESTED_FPS: u32 = 30;

/// Camera capture through nokhwa. Screen capture is not provided here.
///
/// Each opened track owns a thread that holds the camera, decodes frames as
/// they arrive and keeps only the newest one for `grab`.
#[derive(Debug, Clone, Default)]
pub struct NokhwaCamera {
    index: u32,
}

impl NokhwaCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl VideoBackend for NokhwaCamera {
    fn open(
        &self,
        source: VideoSource,
        hint: ResolutionHint,
    ) -> Result<Box<dyn VideoTrack>, BackendError> {
        if source == VideoSource::Screen {
            return Err(BackendError::Unavailable(
                "screen capture is not supported by the camera backend".into(),
            ));
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), BackendError>>(1);
        let latest = Arc::new(LatestFrame::default());
        let running = Arc::new(AtomicBool::new(true));
        let index = self.index;
        let thread_latest = latest.clone();
        let thread_running = running.clone();

        let thread = std::thread::Builder::new()
            .name("camera".into())
            .spawn(move || {
                let mut camera = match open_camera(index, hint) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                while thread_running.load(Ordering::SeqCst) {
                    let decoded = camera
                        .frame()
                        .and_then(|buffer| buffer.decode_image::<RgbFormat>());
                    match decoded {
                        Ok(frame) => {
                            let (width, height) = (frame.width(), frame.height());
                            if let Some(frame) = RgbImage::from_raw(width, height, frame.into_raw())
                            {
                                thread_latest.store(frame);
                            }
                        }
                        Err(e) => tracing::warn!("camera frame dropped: {}", e),
                    }
                }
                if let Err(e) = camera.stop_stream() {
                    tracing::warn!("failed to stop camera stream: {}", e);
                }
                tracing::debug!("camera released");
            })
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CameraTrack {
                latest,
                running,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(BackendError::Stream("camera thread exited".into()))
            }
        }
    }
}

fn open_camera(index: u32, hint: ResolutionHint) -> Result<Camera, BackendError> {
    let format = CameraFormat::new(
        Resolution::new(hint.width, hint.height),
        FrameFormat::MJPEG,
        REQUESTED_FPS,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));
    let mut camera = Camera::new(CameraIndex::Index(index), requested)
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;
    // The OS prompt for camera access surfaces here.
    camera
        .open_stream()
        .map_err(|e| BackendError::PermissionDenied(e.to_string()))?;
    tracing::info!("camera: index={}, format={:?}", index, camera.camera_format());
    Ok(camera)
}

/// Newest decoded frame, overwritten as the camera delivers.
#[derive(Default)]
struct LatestFrame(Mutex<Option<RgbImage>>);

impl LatestFrame {
    fn store(&self, frame: RgbImage) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame);
    }

    fn get(&self) -> Option<RgbImage> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

struct CameraTrack {
    latest: Arc<LatestFrame>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MediaTrack for CameraTrack {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("camera thread panicked");
            }
        }
    }

    fn is_live(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::SeqCst)
    }
}

impl VideoTrack for CameraTrack {
    fn grab(&mut self) -> Option<RgbImage> {
        self.latest.get()
    }
}

impl Drop for CameraTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
