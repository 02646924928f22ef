use crate::config::{load_config, save_config, MAX_FPS};
use crate::daemon::{run_daemon, DaemonOptions};
use crate::inference::Delegate;
use crate::ipc::{send_command, ControlMessage, ControlReply};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gesture-overlay",
    version,
    about = "Live hand gesture recognition with a skeleton overlay"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the capture pipeline
    Run {
        /// Camera index
        #[arg(short, long, conflicts_with = "replay")]
        camera: Option<u32>,
        /// Replay images from a directory instead of a camera
        #[arg(short, long)]
        replay: Option<PathBuf>,
        /// Model file or file name inside the configured repo
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long, value_enum)]
        delegate: Option<Delegate>,
        /// Write the composited view to this image file
        #[arg(short, long)]
        preview: Option<PathBuf>,
        /// Start capturing as soon as the recognizer is ready
        #[arg(short, long)]
        enable: bool,
    },
    /// Control capture of a running pipeline
    Camera {
        #[command(subcommand)]
        action: CameraAction,
    },
    /// Persist configuration
    Config {
        #[command(subcommand)]
        setting: ConfigSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAction {
    /// Retry loading the gesture recognizer
    Initialize,
    Enable,
    Disable,
    Toggle,
    Status,
}

impl From<CameraAction> for ControlMessage {
    fn from(action: CameraAction) -> Self {
        match action {
            CameraAction::Initialize => ControlMessage::Initialize,
            CameraAction::Enable => ControlMessage::Enable,
            CameraAction::Disable => ControlMessage::Disable,
            CameraAction::Toggle => ControlMessage::Toggle,
            CameraAction::Status => ControlMessage::Status,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Set the model path
    Model { path: String },
    /// Set the compute delegate
    Delegate {
        #[arg(value_enum)]
        delegate: Delegate,
    },
    /// Set the camera index
    Camera { index: u32 },
    /// Set the capture rate
    Fps {
        #[arg(value_parser = parse_fps)]
        fps: f32,
    },
}

fn parse_fps(value: &str) -> Result<f32, String> {
    let fps: f32 = value.parse().map_err(|e| format!("{e}"))?;
    if fps.is_finite() && fps > 0.0 && fps <= MAX_FPS {
        Ok(fps)
    } else {
        Err(format!("fps must be in (0, {MAX_FPS}]"))
    }
}

pub fn run_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    execute(cli);
}

pub fn execute(cli: Cli) {
    match cli.command {
        Commands::Run {
            camera,
            replay,
            model,
            delegate,
            preview,
            enable,
        } => run(DaemonOptions {
            camera,
            replay,
            model,
            delegate,
            preview,
            enable,
        }),
        Commands::Camera { action } => {
            if let Some(reply) = control(action) {
                println!("{}", describe(&reply));
            }
        }
        Commands::Config { setting } => configure(setting),
    }
}

fn run(options: DaemonOptions) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return;
        }
    };
    runtime.block_on(run_daemon(options));
}

/// Sends `action` to the running pipeline.
pub fn control(action: CameraAction) -> Option<ControlReply> {
    match send_command(action.into()) {
        Ok(reply) => Some(reply),
        Err(e) => {
            error!("pipeline did not answer: {e}");
            None
        }
    }
}

fn describe(reply: &ControlReply) -> String {
    match (&reply.detail, reply.accepted) {
        (Some(detail), false) => format!("{:?} (rejected: {detail})", reply.state),
        (Some(detail), true) => format!("{:?} ({detail})", reply.state),
        (None, _) => format!("{:?}", reply.state),
    }
}

fn configure(setting: ConfigSubcommand) {
    let mut cfg = load_config();
    match setting {
        ConfigSubcommand::Model { path } => {
            info!("model set to {path}");
            cfg.model_path = path;
        }
        ConfigSubcommand::Delegate { delegate } => {
            info!(?delegate, "delegate set");
            cfg.delegate = delegate;
        }
        ConfigSubcommand::Camera { index } => {
            info!("camera set to {index}");
            cfg.camera_index = index;
        }
        ConfigSubcommand::Fps { fps } => {
            info!("capture fps set to {fps}");
            cfg.fps = fps;
        }
    }
    save_config(&cfg);
}
