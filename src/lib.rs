pub mod buffer;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod data;
pub mod display;
pub mod error;
pub mod frame;
pub mod gate;
pub mod gesture;
pub mod inference;
pub mod ipc;
pub mod overlay;
pub mod pipeline;
pub mod preview;

pub use cli::{control, execute, run_cli, CameraAction, Cli, Commands, ConfigSubcommand};
pub use config::{load_config, save_config, Config};
pub use error::{InferenceError, PipelineError};
pub use pipeline::{PipelineController, PipelineEvent, PipelineState};
