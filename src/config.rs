use crate::frame::CameraSettings;
use crate::inference::{Delegate, ModelSettings};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use tracing::error;

pub const MIN_FPS: f32 = 0.1;
pub const MAX_FPS: f32 = 1000.0;

/// Capture rate bounded to what the tick timer can express.
pub fn clamp_fps(fps: f32) -> f32 {
    if fps.is_nan() {
        return Config::default().fps;
    }
    fps.clamp(MIN_FPS, MAX_FPS)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model_path: String,
    pub model_repo: Option<String>,
    pub delegate: Delegate,
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub mirrored: bool,
    pub min_hand_confidence: f32,
    pub input_size: u32,
    pub preview_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: "models/hand_landmark.onnx".to_string(),
            model_repo: None,
            delegate: Delegate::Cpu,
            camera_index: 0,
            width: 1280,
            height: 720,
            fps: 30.0,
            mirrored: true,
            min_hand_confidence: 0.5,
            input_size: 224,
            preview_interval_ms: 200,
        }
    }
}

impl Config {
    pub fn model_settings(&self) -> ModelSettings {
        let path = env::var("GESTURE_OVERLAY_MODEL").unwrap_or_else(|_| self.model_path.clone());
        ModelSettings {
            path,
            repo: self.model_repo.clone(),
            input_size: self.input_size,
            min_hand_confidence: self.min_hand_confidence,
        }
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            index: self.camera_index,
            width: self.width,
            height: self.height,
            fps: clamp_fps(self.fps).round().max(1.0) as u32,
        }
    }
}

fn config_path() -> PathBuf {
    env::var_os("GESTURE_OVERLAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("gesture-overlay.json"))
}

pub fn load_config() -> Config {
    let path = config_path();
    if let Ok(data) = fs::read(&path) {
        match serde_json::from_slice(&data) {
            Ok(cfg) => return cfg,
            Err(e) => error!(path = %path.display(), "ignoring invalid config: {e}"),
        }
    }
    Config::default()
}

pub fn save_config(cfg: &Config) {
    let path = config_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match serde_json::to_vec_pretty(cfg) {
        Ok(data) => {
            if let Err(e) = fs::write(&path, data) {
                error!("failed to write config: {e}");
            }
        }
        Err(e) => error!("failed to encode config: {e}"),
    }
}
