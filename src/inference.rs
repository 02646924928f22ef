use crate::data::{Category, Landmark, LandmarkSet, Recognition, HAND_LANDMARKS};
use crate::error::{InferenceError, PipelineError};
use crate::frame::Frame;
use crate::gesture;
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use hf_hub::api::sync::Api;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Where the model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    #[default]
    Cpu,
    Gpu,
}

/// The opaque recognizer consumed by the pipeline.
#[async_trait]
pub trait InferenceCapability: Send + Sync {
    async fn infer(&self, frame: &Frame, timestamp_ms: u64) -> Result<Recognition, InferenceError>;
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Local path, or file name inside `repo`.
    pub path: String,
    pub repo: Option<String>,
    /// Square input edge expected by the model.
    pub input_size: u32,
    pub min_hand_confidence: f32,
}

/// Loads the hand landmark model and prepares it for `delegate`.
pub async fn initialize(
    settings: ModelSettings,
    delegate: Delegate,
) -> Result<Arc<dyn InferenceCapability>, PipelineError> {
    let loaded = tokio::task::spawn_blocking(move || OnnxRecognizer::load(settings, delegate))
        .await
        .map_err(|e| PipelineError::InitializationFailure(e.to_string()))??;
    Ok(Arc::new(loaded))
}

struct OnnxModel {
    model: onnx::ModelProto,
    input_name: String,
    output_names: Vec<String>,
    device: Device,
    settings: ModelSettings,
}

/// Hand landmark model evaluated with candle.
///
/// Outputs are read by position: landmarks `[1, 63]` in input pixels,
/// hand presence `[1, 1]`, handedness `[1, 1]` (probability of a right hand).
pub struct OnnxRecognizer {
    inner: Arc<OnnxModel>,
}

fn resolve_model(settings: &ModelSettings) -> Result<String, PipelineError> {
    if Path::new(&settings.path).exists() {
        return Ok(settings.path.clone());
    }
    let Some(repo) = &settings.repo else {
        return Err(PipelineError::InitializationFailure(format!(
            "model {} not found",
            settings.path
        )));
    };
    info!(repo = %repo, file = %settings.path, "downloading model");
    Api::new()
        .and_then(|api| api.model(repo.clone()).get(&settings.path))
        .map(|p| p.to_string_lossy().into())
        .map_err(|e| PipelineError::InitializationFailure(format!("failed to download model: {e}")))
}

impl OnnxRecognizer {
    pub fn load(settings: ModelSettings, delegate: Delegate) -> Result<Self, PipelineError> {
        let init_err = |e: &dyn std::fmt::Display| PipelineError::InitializationFailure(e.to_string());
        let model_path = resolve_model(&settings)?;
        let model = read_file(&model_path).map_err(|e| init_err(&e))?;
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| init_err(&"model graph missing"))?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| init_err(&"model has no inputs"))?;
        let output_names: Vec<String> = graph.output.iter().map(|o| o.name.clone()).collect();
        if output_names.len() < 3 {
            return Err(init_err(&format!(
                "expected 3 model outputs, found {}",
                output_names.len()
            )));
        }
        let device = match delegate {
            Delegate::Cpu => Device::Cpu,
            Delegate::Gpu => Device::new_cuda(0).map_err(|e| init_err(&e))?,
        };
        debug!(path = %model_path, ?delegate, "gesture model loaded");
        Ok(Self {
            inner: Arc::new(OnnxModel {
                model,
                input_name,
                output_names,
                device,
                settings,
            }),
        })
    }
}

fn output_values(
    outputs: &mut HashMap<String, Tensor>,
    name: &str,
) -> Result<Vec<f32>, InferenceError> {
    let tensor = outputs
        .remove(name)
        .ok_or_else(|| InferenceError::MissingOutput(name.to_string()))?;
    Ok(tensor.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}

impl OnnxModel {
    fn run(&self, frame: &Frame) -> Result<Recognition, InferenceError> {
        let size = self.settings.input_size;
        let resized = imageops::resize(&*frame.image, size, size, FilterType::Triangle);
        let tensor = Tensor::from_vec(
            resized.into_raw(),
            (size as usize, size as usize, 3),
            &self.device,
        )?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)?
        .unsqueeze(0)?;
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), tensor);
        let mut outputs = simple_eval(&self.model, inputs)?;

        let coords = output_values(&mut outputs, &self.output_names[0])?;
        let presence = output_values(&mut outputs, &self.output_names[1])?;
        let right = output_values(&mut outputs, &self.output_names[2])?;
        let presence = presence.first().copied().unwrap_or(0.0);
        if presence < self.settings.min_hand_confidence {
            trace!(presence, "no hand");
            return Ok(Recognition::empty());
        }
        if coords.len() < HAND_LANDMARKS * 3 {
            return Err(InferenceError::Malformed(format!(
                "expected {} landmark values, found {}",
                HAND_LANDMARKS * 3,
                coords.len()
            )));
        }
        if let Some(bad) = coords[..HAND_LANDMARKS * 3].iter().find(|v| !v.is_finite()) {
            return Err(InferenceError::Malformed(format!("landmark value {bad}")));
        }
        let scale = size as f32;
        let hand: LandmarkSet = coords
            .chunks_exact(3)
            .take(HAND_LANDMARKS)
            .map(|c| Landmark::new(c[0] / scale, c[1] / scale, c[2] / scale))
            .collect();
        let right = right.first().copied().unwrap_or(0.5);
        let handedness = if right >= 0.5 {
            Category::new("Right", right)
        } else {
            Category::new("Left", 1.0 - right)
        };
        let gesture = Category::new(gesture::classify(&hand), presence);
        Ok(Recognition {
            gestures: vec![vec![gesture]],
            handedness: vec![vec![handedness]],
            landmarks: vec![hand],
        })
    }
}

#[async_trait]
impl InferenceCapability for OnnxRecognizer {
    async fn infer(&self, frame: &Frame, timestamp_ms: u64) -> Result<Recognition, InferenceError> {
        let model = self.inner.clone();
        let frame = frame.clone();
        trace!(timestamp_ms, "running inference");
        tokio::task::spawn_blocking(move || model.run(&frame))
            .await
            .map_err(|e| InferenceError::Task(e.to_string()))?
    }
}
