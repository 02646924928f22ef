use crate::config::clamp_fps;
use crate::error::PipelineError;
use image::{ImageFormat, RgbImage};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc, Mutex, PoisonError,
};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// `current_frame` returns the latest frame without waiting for a new one.
pub trait FrameSource {
    fn start(&mut self) -> Result<(), PipelineError>;
    fn stop(&mut self);
    fn current_frame(&mut self) -> Result<Option<Frame>, PipelineError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CameraSettings {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

type FrameSlot = Arc<Mutex<Option<Frame>>>;

/// Live camera capture on a dedicated thread.
pub struct CameraSource {
    settings: CameraSettings,
    latest: FrameSlot,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CameraSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

fn open_camera(settings: CameraSettings) -> Result<Camera, PipelineError> {
    let index = CameraIndex::Index(settings.index);
    let mut cam = None;
    for (w, h) in [(settings.width, settings.height), (1280, 720), (640, 480)] {
        for fmt in [FrameFormat::RAWRGB, FrameFormat::MJPEG, FrameFormat::YUYV] {
            let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                CameraFormat::new_from(w, h, fmt, settings.fps),
            ));
            if let Ok(c) = Camera::new(index.clone(), req) {
                cam = Some(c);
                break;
            }
        }
        if cam.is_some() {
            break;
        }
    }
    let fallback = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    let mut cam = match cam {
        Some(c) => c,
        None => Camera::new(index, fallback)
            .map_err(|e| PipelineError::DeviceUnavailable(e.to_string()))?,
    };
    cam.open_stream()
        .map_err(|e| PipelineError::DeviceUnavailable(format!("failed to open stream: {e}")))?;
    debug!(format = ?cam.camera_format(), "camera stream opened");
    Ok(cam)
}

fn capture_loop(mut cam: Camera, latest: FrameSlot, running: Arc<AtomicBool>) {
    let epoch = Instant::now();
    let mut last_ts = None;
    while running.load(Ordering::Relaxed) {
        let buffer = match cam.frame() {
            Ok(b) => b,
            Err(e) => {
                error!("failed to capture frame: {e}");
                continue;
            }
        };
        let image = match buffer.decode_image::<RgbFormat>() {
            Ok(i) => i,
            Err(e) => {
                error!("failed to decode frame: {e}");
                continue;
            }
        };
        let elapsed = epoch.elapsed().as_millis() as u64;
        let timestamp_ms = match last_ts {
            Some(prev) if elapsed <= prev => prev + 1,
            _ => elapsed,
        };
        last_ts = Some(timestamp_ms);
        trace!(timestamp_ms, "frame captured");
        *latest.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Frame::new(image, timestamp_ms));
    }
    if let Err(e) = cam.stop_stream() {
        warn!("failed to stop camera stream: {e}");
    }
    debug!("capture thread stopped");
}

impl FrameSource for CameraSource {
    fn start(&mut self) -> Result<(), PipelineError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let settings = self.settings;
        let latest = self.latest.clone();
        let running = self.running.clone();
        running.store(true, Ordering::Relaxed);
        let (opened_tx, opened_rx) = mpsc::channel();
        let worker = std::thread::spawn(move || match open_camera(settings) {
            Ok(cam) => {
                let _ = opened_tx.send(Ok(()));
                capture_loop(cam, latest, running);
            }
            Err(e) => {
                let _ = opened_tx.send(Err(e));
            }
        });
        let opened = opened_rx.recv().unwrap_or_else(|_| {
            Err(PipelineError::DeviceUnavailable(
                "capture thread exited".into(),
            ))
        });
        match opened {
            Ok(()) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = worker.join();
                error!("failed to open camera: {e}");
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("capture thread panicked");
            }
        }
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn current_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.worker.is_none() {
            return Err(PipelineError::DeviceUnavailable(
                "camera was not opened".into(),
            ));
        }
        Ok(self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Replays the images of a directory in name order at a fixed rate, looping.
pub struct DirectorySource {
    dir: PathBuf,
    fps: f32,
    frames: Vec<PathBuf>,
    started: Option<Instant>,
    current: Option<(u64, Frame)>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, fps: f32) -> Self {
        Self {
            dir: dir.into(),
            fps: clamp_fps(fps),
            frames: Vec::new(),
            started: None,
            current: None,
        }
    }
}

impl FrameSource for DirectorySource {
    fn start(&mut self) -> Result<(), PipelineError> {
        let unavailable = |detail: String| {
            error!("{detail}");
            PipelineError::DeviceUnavailable(detail)
        };
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| unavailable(format!("cannot read {}: {e}", self.dir.display())))?;
        let mut frames: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && ImageFormat::from_path(p).is_ok())
            .collect();
        if frames.is_empty() {
            return Err(unavailable(format!("no frames in {}", self.dir.display())));
        }
        frames.sort();
        debug!(dir = %self.dir.display(), count = frames.len(), "replay source started");
        self.frames = frames;
        self.started = Some(Instant::now());
        self.current = None;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = None;
        self.current = None;
    }

    fn current_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let Some(started) = self.started else {
            return Err(PipelineError::DeviceUnavailable(format!(
                "replay of {} was not started",
                self.dir.display()
            )));
        };
        let tick = (started.elapsed().as_secs_f64() * self.fps as f64) as u64;
        if let Some((current, frame)) = &self.current {
            if *current == tick {
                return Ok(Some(frame.clone()));
            }
        }
        let path = &self.frames[(tick % self.frames.len() as u64) as usize];
        match image::open(path) {
            Ok(img) => {
                let timestamp_ms = (tick as f64 * 1000.0 / self.fps as f64) as u64;
                let frame = Frame::new(img.into_rgb8(), timestamp_ms);
                self.current = Some((tick, frame.clone()));
                Ok(Some(frame))
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to decode frame: {e}");
                Ok(self.current.as_ref().map(|(_, f)| f.clone()))
            }
        }
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn start(&mut self) -> Result<(), PipelineError> {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn current_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        (**self).current_frame()
    }
}
