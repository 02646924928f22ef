mod common;

use common::*;
use gesture_overlay::data::Recognition;
use gesture_overlay::inference::InferenceCapability;
use gesture_overlay::ipc::ControlMessage;
use gesture_overlay::overlay::Surface;
use gesture_overlay::pipeline::ControlRequest;
use gesture_overlay::{PipelineError, PipelineState};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[tokio::test]
async fn open_palm_then_no_hand_clears_display() {
    let source = ScriptedSource::default();
    let display = RecordingDisplay::default();
    let recognizer = FakeRecognizer::with(vec![
        (100, recognized("Open_Palm", 0.92, "Right")),
        (166, Recognition::empty()),
    ]);
    let mut c = ready_controller(source.clone(), display.clone(), recognizer.clone()).await;
    c.enable().unwrap();

    source.push(frame(64, 48, 100));
    c.tick();
    source.push(frame(64, 48, 133));
    c.tick();
    let stats = c.gate_stats().unwrap();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.dropped, 1);

    assert!(c.process_next_event().await);
    c.tick();
    assert_eq!(display.last(), Some(Some("Open_Palm 92.00%".to_string())));
    assert!(!c.renderer().surface().is_blank());

    source.push(frame(64, 48, 166));
    c.tick();
    assert!(c.process_next_event().await);
    c.tick();
    assert_eq!(display.last(), Some(None));
    assert!(c.renderer().surface().is_blank());
    let stored = c.buffer().read().unwrap();
    assert_eq!(stored.frame_timestamp_ms, 166);
    assert!(stored.result.is_none());
    assert_eq!(recognizer.calls(), 2);
}

#[tokio::test]
async fn failed_inference_keeps_last_good_result() {
    let source = ScriptedSource::default();
    let display = RecordingDisplay::default();
    let recognizer = FakeRecognizer::with(vec![(10, recognized("Victory", 0.8, "Left"))]);
    let mut c = ready_controller(source.clone(), display.clone(), recognizer).await;
    c.enable().unwrap();

    source.push(frame(32, 32, 10));
    c.tick();
    assert!(c.process_next_event().await);
    source.push(frame(32, 32, 20));
    c.tick();
    assert!(c.process_next_event().await);
    c.tick();

    assert_eq!(c.gate_stats().unwrap().failed, 1);
    assert_eq!(c.buffer().read().unwrap().frame_timestamp_ms, 10);
    assert_eq!(display.last(), Some(Some("Victory 80.00%".to_string())));
}

#[tokio::test]
async fn initialization_failure_rejects_enable() {
    let mut c = controller(ScriptedSource::default(), RecordingDisplay::default());
    c.initialize(async {
        Err::<Arc<dyn InferenceCapability>, _>(PipelineError::InitializationFailure(
            "model missing".into(),
        ))
    });
    assert_eq!(c.state(), PipelineState::Initializing);
    assert_eq!(
        c.enable(),
        Err(PipelineError::NotReady(PipelineState::Initializing))
    );

    assert!(c.process_next_event().await);
    assert_eq!(c.state(), PipelineState::Idle);
    assert!(matches!(
        c.last_error(),
        Some(PipelineError::InitializationFailure(_))
    ));
    assert_eq!(c.enable(), Err(PipelineError::NotReady(PipelineState::Idle)));
    assert_eq!(c.state(), PipelineState::Idle);
}

#[tokio::test]
async fn unavailable_device_keeps_pipeline_ready() {
    let source = ScriptedSource {
        fail_start: true,
        ..Default::default()
    };
    let mut c = ready_controller(source, RecordingDisplay::default(), FakeRecognizer::with(vec![])).await;
    assert!(matches!(
        c.enable(),
        Err(PipelineError::DeviceUnavailable(_))
    ));
    assert_eq!(c.state(), PipelineState::Ready);
}

#[tokio::test]
async fn surface_follows_frame_dimensions() {
    let source = ScriptedSource::default();
    let recognizer = FakeRecognizer::with(vec![(1, recognized("Open_Palm", 0.9, "Right"))]);
    let mut c = ready_controller(source.clone(), RecordingDisplay::default(), recognizer).await;
    c.enable().unwrap();

    source.push(frame(640, 480, 1));
    c.tick();
    assert_eq!(c.renderer().surface().dimensions(), (640, 480));
    assert!(c.process_next_event().await);

    source.push(frame(320, 240, 2));
    c.tick();
    assert_eq!(c.renderer().surface().dimensions(), (320, 240));
    assert!(!c.renderer().surface().is_blank());
}

#[tokio::test]
async fn restart_discards_previous_session() {
    let source = ScriptedSource::default();
    let display = RecordingDisplay::default();
    let recognizer = FakeRecognizer::with(vec![
        (10, recognized("Open_Palm", 0.9, "Right")),
        (20, recognized("Closed_Fist", 0.7, "Right")),
    ]);
    let mut c = ready_controller(source.clone(), display.clone(), recognizer).await;
    c.enable().unwrap();

    source.push(frame(48, 48, 10));
    c.tick();
    assert!(c.process_next_event().await);
    c.tick();
    assert!(c.buffer().read().is_some());

    // inference for t=20 is still outstanding when capture stops
    source.push(frame(48, 48, 20));
    c.tick();
    c.disable();
    assert_eq!(c.state(), PipelineState::Stopped);
    assert!(c.buffer().read().is_none());
    assert!(c.renderer().surface().is_blank());
    assert_eq!(display.last(), Some(None));

    c.enable().unwrap();
    assert!(c.process_next_event().await);
    assert!(c.buffer().read().is_none());

    source.push(frame(48, 48, 5));
    c.tick();
    assert!(c.renderer().surface().is_blank());
    assert_eq!(c.gate_stats().unwrap().started, 3);
}

#[tokio::test]
async fn control_messages_drive_transitions() {
    let mut c = ready_controller(
        ScriptedSource::default(),
        RecordingDisplay::default(),
        FakeRecognizer::with(vec![]),
    )
    .await;

    let reply = c.apply(ControlMessage::Toggle);
    assert!(reply.accepted);
    assert_eq!(reply.state, PipelineState::Running);

    let reply = c.apply(ControlMessage::Toggle);
    assert_eq!(reply.state, PipelineState::Stopped);

    let reply = c.apply(ControlMessage::Status);
    assert_eq!(reply.state, PipelineState::Stopped);
    assert!(reply.detail.is_none());

    c.shutdown();
    let reply = c.apply(ControlMessage::Enable);
    assert!(!reply.accepted);
    assert_eq!(reply.state, PipelineState::Idle);
    assert!(reply.detail.unwrap().contains("not ready"));
}

#[tokio::test]
async fn run_loop_serves_control_requests() {
    let mut c = ready_controller(
        ScriptedSource::default(),
        RecordingDisplay::default(),
        FakeRecognizer::with(vec![]),
    )
    .await;
    let (requests, control) = mpsc::channel(4);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let (reply_tx, reply_rx) = oneshot::channel();
        requests
            .send(ControlRequest {
                message: ControlMessage::Enable,
                reply: reply_tx,
            })
            .await
            .unwrap();
        let reply = reply_rx.await.unwrap();
        stop_tx.send(()).unwrap();
        reply
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };
    let ((), reply) = tokio::join!(c.run(30.0, control, shutdown), driver);

    assert!(reply.accepted);
    assert_eq!(reply.state, PipelineState::Running);
    assert_eq!(c.state(), PipelineState::Idle);
}

#[tokio::test]
async fn restarts_never_overlap_inferences() {
    let source = ScriptedSource::default();
    let recognizer = FakeRecognizer::with(vec![(1, recognized("Open_Palm", 0.9, "Right"))]);
    let mut c = ready_controller(source.clone(), RecordingDisplay::default(), recognizer.clone()).await;

    for ts in 1..=5 {
        c.enable().unwrap();
        source.push(frame(16, 16, ts));
        c.tick();
        c.disable();
    }
    assert!(c.process_next_event().await);

    assert_eq!(recognizer.calls(), 1);
    assert_eq!(recognizer.peak(), 1);
    let stats = c.gate_stats().unwrap();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.dropped, 4);
    assert!(c.buffer().read().is_none());

    c.enable().unwrap();
    source.push(frame(16, 16, 6));
    c.tick();
    assert_eq!(c.gate_stats().unwrap().started, 2);
}

#[tokio::test]
async fn tick_reads_source_once() {
    let source = ScriptedSource::default();
    let recognizer = FakeRecognizer::with(vec![(1, recognized("Open_Palm", 0.9, "Right"))]);
    let mut c = ready_controller(source.clone(), RecordingDisplay::default(), recognizer).await;
    c.enable().unwrap();

    source.push(frame(40, 30, 1));
    c.tick();
    assert_eq!(source.reads.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(c.renderer().surface().dimensions(), (40, 30));
}

#[tokio::test]
async fn failed_initialization_can_be_retried() {
    let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let recognizer = FakeRecognizer::with(vec![]);
    let loader = {
        let attempts = attempts.clone();
        move || {
            let attempt = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let capability: Arc<dyn InferenceCapability> = recognizer.clone();
            async move {
                if attempt == 0 {
                    Err(PipelineError::InitializationFailure("model missing".into()))
                } else {
                    Ok(capability)
                }
            }
        }
    };
    let mut c = controller(ScriptedSource::default(), RecordingDisplay::default()).with_loader(loader);

    c.load().unwrap();
    let reply = c.apply(ControlMessage::Enable);
    assert!(!reply.accepted);
    assert_eq!(reply.state, PipelineState::Initializing);

    assert!(c.process_next_event().await);
    let reply = c.apply(ControlMessage::Status);
    assert_eq!(reply.state, PipelineState::Idle);
    assert!(reply.detail.unwrap().contains("model missing"));

    let reply = c.apply(ControlMessage::Initialize);
    assert!(reply.accepted);
    assert_eq!(reply.state, PipelineState::Initializing);
    assert!(c.process_next_event().await);
    assert_eq!(c.state(), PipelineState::Ready);
    assert!(c.last_error().is_none());
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn initialize_without_loader_is_rejected() {
    let mut c = controller(ScriptedSource::default(), RecordingDisplay::default());
    let reply = c.apply(ControlMessage::Initialize);
    assert!(!reply.accepted);
    assert_eq!(reply.state, PipelineState::Idle);
}

#[tokio::test]
async fn enables_once_ready_when_requested() {
    let recognizer = FakeRecognizer::with(vec![]);
    let mut c = controller(ScriptedSource::default(), RecordingDisplay::default()).with_loader(
        move || {
            let capability: Arc<dyn InferenceCapability> = recognizer.clone();
            async move { Ok::<_, PipelineError>(capability) }
        },
    );
    c.enable_when_ready();
    c.load().unwrap();
    assert_eq!(c.state(), PipelineState::Initializing);
    assert!(c.process_next_event().await);
    assert_eq!(c.state(), PipelineState::Running);
}

#[tokio::test]
async fn run_loop_survives_extreme_rates() {
    for fps in [1e30, f32::INFINITY, f32::NAN, 0.0, -5.0] {
        let mut c = ready_controller(
            ScriptedSource::default(),
            RecordingDisplay::default(),
            FakeRecognizer::with(vec![]),
        )
        .await;
        let (_requests, control) = mpsc::channel(1);
        c.run(fps, control, tokio::task::yield_now()).await;
        assert_eq!(c.state(), PipelineState::Idle);
    }
}
