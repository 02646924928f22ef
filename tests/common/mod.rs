#![allow(dead_code)]

use async_trait::async_trait;
use gesture_overlay::data::{Category, Landmark, LandmarkSet, Recognition};
use gesture_overlay::display::{GestureSummary, ResultDisplay};
use gesture_overlay::frame::{Frame, FrameSource};
use gesture_overlay::inference::InferenceCapability;
use gesture_overlay::overlay::{ImageSurface, OverlayRenderer, ViewTransform};
use gesture_overlay::{InferenceError, PipelineController, PipelineError, PipelineState};
use image::RgbImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn frame(width: u32, height: u32, timestamp_ms: u64) -> Frame {
    Frame::new(RgbImage::new(width, height), timestamp_ms)
}

/// Frame source fed by the test.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    pub current: Arc<Mutex<Option<Frame>>>,
    pub started: Arc<Mutex<bool>>,
    pub reads: Arc<AtomicUsize>,
    pub fail_start: bool,
}

impl ScriptedSource {
    pub fn push(&self, frame: Frame) {
        *self.current.lock().unwrap() = Some(frame);
    }
}

impl FrameSource for ScriptedSource {
    fn start(&mut self) -> Result<(), PipelineError> {
        if self.fail_start {
            return Err(PipelineError::DeviceUnavailable("no camera".into()));
        }
        *self.started.lock().unwrap() = true;
        Ok(())
    }

    fn stop(&mut self) {
        *self.started.lock().unwrap() = false;
        *self.current.lock().unwrap() = None;
    }

    fn current_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !*self.started.lock().unwrap() {
            return Err(PipelineError::DeviceUnavailable("not started".into()));
        }
        Ok(self.current.lock().unwrap().clone())
    }
}

/// Recognizer answering from a table keyed by frame timestamp.
/// Timestamps missing from the table fail.
#[derive(Default)]
pub struct FakeRecognizer {
    pub responses: Mutex<HashMap<u64, Recognition>>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeRecognizer {
    pub fn with(responses: Vec<(u64, Recognition)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceCapability for FakeRecognizer {
    async fn infer(&self, _frame: &Frame, timestamp_ms: u64) -> Result<Recognition, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .get(&timestamp_ms)
            .cloned()
            .ok_or_else(|| InferenceError::Malformed(format!("no response for {timestamp_ms}")))
    }
}

#[derive(Clone, Default)]
pub struct RecordingDisplay {
    pub shown: Arc<Mutex<Vec<Option<String>>>>,
}

impl RecordingDisplay {
    pub fn last(&self) -> Option<Option<String>> {
        self.shown.lock().unwrap().last().cloned()
    }
}

impl ResultDisplay for RecordingDisplay {
    fn show(&mut self, summary: Option<&GestureSummary>) {
        self.shown
            .lock()
            .unwrap()
            .push(summary.map(|s| s.to_string()));
    }
}

pub fn hand() -> LandmarkSet {
    (0..21)
        .map(|i| Landmark::new(0.2 + i as f32 * 0.02, 0.3 + i as f32 * 0.01, 0.0))
        .collect()
}

pub fn recognized(name: &str, score: f32, handedness: &str) -> Recognition {
    Recognition {
        gestures: vec![vec![Category::new(name, score)]],
        handedness: vec![vec![Category::new(handedness, 0.9)]],
        landmarks: vec![hand()],
    }
}

pub type TestController = PipelineController<ScriptedSource, ImageSurface>;

pub fn controller(source: ScriptedSource, display: RecordingDisplay) -> TestController {
    let renderer = OverlayRenderer::new(ImageSurface::new(), ViewTransform { mirrored: true });
    PipelineController::new(source, renderer, Box::new(display))
}

/// A controller in `Ready` backed by `recognizer`.
pub async fn ready_controller(
    source: ScriptedSource,
    display: RecordingDisplay,
    recognizer: Arc<FakeRecognizer>,
) -> TestController {
    let mut controller = controller(source, display);
    let capability: Arc<dyn InferenceCapability> = recognizer;
    controller.initialize(async move { Ok::<_, PipelineError>(capability) });
    assert!(controller.process_next_event().await);
    assert_eq!(controller.state(), PipelineState::Ready);
    controller
}
