use crate::buffer::{ResultBuffer, WriteStatus};
use crate::config::clamp_fps;
use crate::data::Recognition;
use crate::display::ResultDisplay;
use crate::error::{InferenceError, PipelineError};
use crate::frame::{Frame, FrameSource};
use crate::gate::{GateStats, InferenceGate, InferenceTicket};
use crate::inference::InferenceCapability;
use crate::ipc::{ControlMessage, ControlReply};
use crate::overlay::{OverlayRenderer, Surface};
use crate::preview::Presenter;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Initializing,
    Ready,
    Running,
    Stopped,
}

pub enum PipelineEvent {
    Initialized(Result<Arc<dyn InferenceCapability>, PipelineError>),
    FrameCaptured(Frame),
    InferenceCompleted {
        ticket: InferenceTicket,
        result: Result<Recognition, InferenceError>,
    },
    RenderRequested,
}

pub struct ControlRequest {
    pub message: ControlMessage,
    pub reply: oneshot::Sender<ControlReply>,
}

pub type LoadFuture =
    Pin<Box<dyn Future<Output = Result<Arc<dyn InferenceCapability>, PipelineError>> + Send>>;

/// Produces a fresh recognizer load for every initialization attempt.
pub type Loader = Box<dyn Fn() -> LoadFuture + Send>;

pub struct PipelineController<F, S> {
    state: PipelineState,
    source: F,
    renderer: OverlayRenderer<S>,
    display: Box<dyn ResultDisplay>,
    presenter: Option<Box<dyn Presenter<S>>>,
    buffer: ResultBuffer,
    gate: Option<InferenceGate>,
    loader: Option<Loader>,
    enable_on_ready: bool,
    frame: Option<Frame>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<PipelineEvent>>,
    last_captured_ms: Option<u64>,
    last_error: Option<PipelineError>,
}

impl<F: FrameSource, S: Surface> PipelineController<F, S> {
    pub fn new(source: F, renderer: OverlayRenderer<S>, display: Box<dyn ResultDisplay>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: PipelineState::Idle,
            source,
            renderer,
            display,
            presenter: None,
            buffer: ResultBuffer::new(),
            gate: None,
            loader: None,
            enable_on_ready: false,
            frame: None,
            events_tx,
            events_rx: Some(events_rx),
            last_captured_ms: None,
            last_error: None,
        }
    }

    pub fn with_presenter(mut self, presenter: Box<dyn Presenter<S>>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn with_loader<L, Fut>(mut self, loader: L) -> Self
    where
        L: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Arc<dyn InferenceCapability>, PipelineError>> + Send + 'static,
    {
        self.loader = Some(Box::new(move || Box::pin(loader()) as LoadFuture));
        self
    }

    /// Enables capture as soon as the recognizer becomes ready.
    pub fn enable_when_ready(&mut self) {
        self.enable_on_ready = true;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    pub fn renderer(&self) -> &OverlayRenderer<S> {
        &self.renderer
    }

    pub fn gate_stats(&self) -> Option<GateStats> {
        self.gate.as_ref().map(InferenceGate::stats)
    }

    pub fn last_error(&self) -> Option<&PipelineError> {
        self.last_error.as_ref()
    }

    /// Starts loading the recognizer. Only valid from `Idle`; a failed load
    /// returns there and needs another call.
    pub fn initialize<L>(&mut self, loader: L)
    where
        L: Future<Output = Result<Arc<dyn InferenceCapability>, PipelineError>> + Send + 'static,
    {
        if self.state != PipelineState::Idle {
            debug!(state = ?self.state, "initialization already done or in progress");
            return;
        }
        self.state = PipelineState::Initializing;
        self.last_error = None;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = loader.await;
            let _ = events.send(PipelineEvent::Initialized(result));
        });
        debug!("initializing gesture recognizer");
    }

    /// Starts the configured loader. Used for the first load and for retries
    /// after a failed one.
    pub fn load(&mut self) -> Result<(), PipelineError> {
        let Some(loader) = self.loader.as_ref() else {
            return Err(PipelineError::InitializationFailure(
                "no recognizer configured".into(),
            ));
        };
        let load = loader();
        self.initialize(load);
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Running => Ok(()),
            PipelineState::Ready | PipelineState::Stopped => {
                if let Err(e) = self.source.start() {
                    error!("failed to start capture: {e}");
                    self.last_error = Some(e.clone());
                    return Err(e);
                }
                self.last_captured_ms = None;
                self.state = PipelineState::Running;
                info!("capture enabled");
                Ok(())
            }
            state @ (PipelineState::Idle | PipelineState::Initializing) => {
                warn!(?state, "gesture recognizer is not ready");
                Err(PipelineError::NotReady(state))
            }
        }
    }

    pub fn disable(&mut self) {
        if self.state != PipelineState::Running {
            return;
        }
        self.source.stop();
        self.frame = None;
        self.buffer.reset();
        self.renderer.clear();
        self.display.show(None);
        self.last_captured_ms = None;
        self.state = PipelineState::Stopped;
        info!(generation = self.buffer.generation(), "capture disabled");
    }

    pub fn toggle(&mut self) -> Result<(), PipelineError> {
        if self.state == PipelineState::Running {
            self.disable();
            Ok(())
        } else {
            self.enable()
        }
    }

    pub fn shutdown(&mut self) {
        self.disable();
        self.gate = None;
        self.state = PipelineState::Idle;
        debug!("pipeline shut down");
    }

    /// Reads the source once, submits the frame if it is new and renders it.
    pub fn tick(&mut self) {
        if self.state != PipelineState::Running {
            return;
        }
        match self.source.current_frame() {
            Ok(Some(frame)) => {
                let fresh = self
                    .last_captured_ms
                    .map_or(true, |last| frame.timestamp_ms > last);
                self.frame = Some(frame.clone());
                if fresh {
                    self.last_captured_ms = Some(frame.timestamp_ms);
                    self.handle(PipelineEvent::FrameCaptured(frame));
                }
            }
            Ok(None) => trace!("no frame yet"),
            Err(e) => warn!("frame unavailable: {e}"),
        }
        self.handle(PipelineEvent::RenderRequested);
    }

    pub fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Initialized(result) => self.on_initialized(result),
            PipelineEvent::FrameCaptured(frame) => {
                let generation = self.buffer.generation();
                if let Some(gate) = self.gate.as_mut() {
                    gate.submit(frame, generation);
                }
            }
            PipelineEvent::InferenceCompleted { ticket, result } => {
                let Some(gate) = self.gate.as_mut() else {
                    return;
                };
                if let Some(outcome) = gate.complete(ticket, result) {
                    match self.buffer.write(ticket.generation, outcome) {
                        WriteStatus::Accepted => {
                            trace!(timestamp_ms = ticket.frame_timestamp_ms, "result stored")
                        }
                        WriteStatus::Stale(reason) => trace!(?reason, "stale completion"),
                    }
                }
            }
            PipelineEvent::RenderRequested => self.render(),
        }
    }

    fn on_initialized(&mut self, result: Result<Arc<dyn InferenceCapability>, PipelineError>) {
        if self.state != PipelineState::Initializing {
            debug!(state = ?self.state, "discarding late initialization");
            return;
        }
        match result {
            Ok(capability) => {
                self.gate = Some(InferenceGate::new(capability, self.events_tx.clone()));
                self.state = PipelineState::Ready;
                info!("gesture recognizer ready");
                if std::mem::take(&mut self.enable_on_ready) {
                    let _ = self.enable();
                }
            }
            Err(e) => {
                error!("{e}");
                self.last_error = Some(e);
                self.state = PipelineState::Idle;
            }
        }
    }

    fn render(&mut self) {
        if self.state != PipelineState::Running {
            return;
        }
        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        self.renderer.tick(
            frame.dimensions(),
            self.buffer.read(),
            self.display.as_mut(),
        );
        if let Some(presenter) = self.presenter.as_mut() {
            let video = self.renderer.transform().present(&frame.image);
            presenter.present(&video, self.renderer.surface());
        }
    }

    /// Returns `false` when no receiver is available.
    pub async fn process_next_event(&mut self) -> bool {
        let Some(events) = self.events_rx.as_mut() else {
            return false;
        };
        let next = events.recv().await;
        match next {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    pub fn apply(&mut self, message: ControlMessage) -> ControlReply {
        let result = match message {
            ControlMessage::Enable => self.enable(),
            ControlMessage::Disable => {
                self.disable();
                Ok(())
            }
            ControlMessage::Toggle => self.toggle(),
            ControlMessage::Initialize => match self.state {
                PipelineState::Idle => self.load(),
                _ => Ok(()),
            },
            ControlMessage::Status => Ok(()),
        };
        ControlReply {
            state: self.state,
            accepted: result.is_ok(),
            detail: result
                .err()
                .or_else(|| self.last_error.clone())
                .map(|e| e.to_string()),
        }
    }

    pub async fn run(
        &mut self,
        fps: f32,
        mut control: mpsc::Receiver<ControlRequest>,
        shutdown: impl Future<Output = ()>,
    ) {
        let Some(mut events) = self.events_rx.take() else {
            error!("pipeline event loop already running");
            return;
        };
        let period = Duration::from_secs_f64(1.0 / clamp_fps(fps) as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.tick(),
                Some(event) = events.recv() => self.handle(event),
                Some(request) = control.recv() => {
                    let reply = self.apply(request.message);
                    let _ = request.reply.send(reply);
                }
            }
        }
        self.events_rx = Some(events);
        self.shutdown();
    }
}
