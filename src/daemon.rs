use crate::config::load_config;
use crate::display::LogDisplay;
use crate::frame::{CameraSource, DirectorySource, FrameSource};
use crate::inference::{self, Delegate};
use crate::ipc::{socket_path, ControlMessage};
use crate::overlay::{ImageSurface, OverlayRenderer, ViewTransform};
use crate::pipeline::{ControlRequest, PipelineController};
use crate::preview::PreviewWriter;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use std::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub camera: Option<u32>,
    pub replay: Option<PathBuf>,
    pub model: Option<String>,
    pub delegate: Option<Delegate>,
    pub preview: Option<PathBuf>,
    pub enable: bool,
}

pub async fn run_daemon(options: DaemonOptions) {
    info!("daemon started");
    let mut cfg = load_config();
    if let Some(index) = options.camera {
        cfg.camera_index = index;
    }
    if let Some(model) = options.model {
        cfg.model_path = model;
    }
    if let Some(delegate) = options.delegate {
        cfg.delegate = delegate;
    }
    debug!(?cfg, "loaded configuration");

    let source: Box<dyn FrameSource> = match &options.replay {
        Some(dir) => Box::new(DirectorySource::new(dir, cfg.fps)),
        None => Box::new(CameraSource::new(cfg.camera_settings())),
    };
    let renderer = OverlayRenderer::new(
        ImageSurface::new(),
        ViewTransform {
            mirrored: cfg.mirrored,
        },
    );
    let model = cfg.model_settings();
    let delegate = cfg.delegate;
    let mut controller = PipelineController::new(source, renderer, Box::new(LogDisplay::default()))
        .with_loader(move || inference::initialize(model.clone(), delegate));
    if let Some(path) = options.preview {
        debug!(path = %path.display(), "writing preview");
        controller = controller.with_presenter(Box::new(PreviewWriter::new(
            path,
            Duration::from_millis(cfg.preview_interval_ms),
        )));
    }

    if options.enable {
        controller.enable_when_ready();
    }

    let sock_path = socket_path();
    if fs::remove_file(&sock_path).is_ok() {
        trace!(path = %sock_path.display(), "removed stale socket");
    }
    let listener = match UnixListener::bind(&sock_path) {
        Ok(l) => {
            debug!(path = %sock_path.display(), "socket bound");
            Some(l)
        }
        Err(e) => {
            error!("failed to bind socket: {e}");
            None
        }
    };
    let (requests_tx, requests_rx) = mpsc::channel(8);
    if let Some(listener) = listener {
        tokio::spawn(serve_control(listener, requests_tx));
    }
    if let Err(e) = controller.load() {
        error!("{e}");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("shutting down");
    };
    controller.run(cfg.fps, requests_rx, shutdown).await;
    let _ = fs::remove_file(&sock_path);
}

async fn serve_control(listener: UnixListener, requests: mpsc::Sender<ControlRequest>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                debug!("connection accepted");
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, requests).await {
                        debug!("control connection failed: {e}");
                    }
                });
            }
            Err(e) => error!("failed to accept connection: {e}"),
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    requests: mpsc::Sender<ControlRequest>,
) -> io::Result<()> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let message: ControlMessage = serde_json::from_slice(&buf)?;
    debug!(?message, "received message");
    let (reply_tx, reply_rx) = oneshot::channel();
    let gone = || io::Error::new(io::ErrorKind::BrokenPipe, "pipeline stopped");
    requests
        .send(ControlRequest {
            message,
            reply: reply_tx,
        })
        .await
        .map_err(|_| gone())?;
    let reply = reply_rx.await.map_err(|_| gone())?;
    stream.write_all(&serde_json::to_vec(&reply)?).await?;
    stream.shutdown().await
}
