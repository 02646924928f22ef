use crate::pipeline::PipelineState;
use thiserror::Error;

/// Failures that are surfaced to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("failed to initialize gesture recognizer: {0}")]
    InitializationFailure(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("gesture recognizer is not ready (state: {0:?})")]
    NotReady(PipelineState),
}

/// A single inference call failed. Recovered locally by the gate.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Model(#[from] candle_core::Error),
    #[error("model output {0:?} missing")]
    MissingOutput(String),
    #[error("malformed model output: {0}")]
    Malformed(String),
    #[error("inference task failed: {0}")]
    Task(String),
}
