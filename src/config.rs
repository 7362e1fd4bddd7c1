use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{
    DetectorSettings, DEFAULT_DETECTOR_WORKERS, DEFAULT_MODEL_NAME, DEFAULT_QUEUE_DEPTH,
};
use crate::frame::PixelFormat;
use crate::geometry::Rect;
use crate::ingest::{SessionConfig, SessionPreset};

const DEFAULT_CAMERA_URI: &str = "stub://back_camera";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_VIEW_WIDTH: f64 = 390.0;
const DEFAULT_VIEW_HEIGHT: f64 = 844.0;
const MAX_CAMERA_FPS: u32 = 240;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    detector: Option<DetectorConfigFile>,
    view: Option<ViewConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    uri: Option<String>,
    fps: Option<u32>,
    preset: Option<SessionPreset>,
    pixel_format: Option<PixelFormat>,
    discard_late_frames: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    dir: Option<PathBuf>,
    name: Option<String>,
    backend: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    workers: Option<usize>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ViewConfigFile {
    width: Option<f64>,
    height: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub detector: DetectorSettings,
    pub view: ViewSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub uri: String,
    pub fps: u32,
    pub preset: SessionPreset,
    pub pixel_format: PixelFormat,
    pub discard_late_frames: bool,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub dir: PathBuf,
    pub name: String,
    pub backend: String,
}

/// Size of the view hosting the preview, in points.
#[derive(Debug, Clone, Copy)]
pub struct ViewSettings {
    pub width: f64,
    pub height: f64,
}

impl ViewSettings {
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

impl PipelineConfig {
    /// Reads the file named by `OVERLAY_CONFIG` (if any), applies env overrides and
    /// validates the result.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OVERLAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let view = file.view.unwrap_or_default();
        Self {
            camera: CameraSettings {
                uri: camera.uri.unwrap_or_else(|| DEFAULT_CAMERA_URI.to_string()),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
                preset: camera.preset.unwrap_or_default(),
                pixel_format: camera.pixel_format.unwrap_or_default(),
                discard_late_frames: camera.discard_late_frames.unwrap_or(true),
            },
            model: ModelSettings {
                dir: model.dir.unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
                name: model.name.unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
                backend: model.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            },
            detector: DetectorSettings {
                workers: detector.workers.unwrap_or(DEFAULT_DETECTOR_WORKERS),
                queue_depth: detector.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
            },
            view: ViewSettings {
                width: view.width.unwrap_or(DEFAULT_VIEW_WIDTH),
                height: view.height.unwrap_or(DEFAULT_VIEW_HEIGHT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(uri) = env_nonempty("OVERLAY_CAMERA_URI") {
            self.camera.uri = uri;
        }
        if let Some(dir) = env_nonempty("OVERLAY_MODEL_DIR") {
            self.model.dir = PathBuf::from(dir);
        }
        if let Some(name) = env_nonempty("OVERLAY_MODEL_NAME") {
            self.model.name = name;
        }
        if let Some(backend) = env_nonempty("OVERLAY_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(preset) = env_nonempty("OVERLAY_PRESET") {
            self.camera.preset = preset
                .parse()
                .map_err(|e| anyhow!("OVERLAY_PRESET: {}", e))?;
        }
        if let Some(workers) = env_nonempty("OVERLAY_DETECTOR_WORKERS") {
            self.detector.workers = workers
                .parse()
                .map_err(|_| anyhow!("OVERLAY_DETECTOR_WORKERS must be a positive integer"))?;
        }
        if let Some(depth) = env_nonempty("OVERLAY_QUEUE_DEPTH") {
            self.detector.queue_depth = depth
                .parse()
                .map_err(|_| anyhow!("OVERLAY_QUEUE_DEPTH must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.fps == 0 || self.camera.fps > MAX_CAMERA_FPS {
            return Err(anyhow!(
                "camera fps must be between 1 and {}, got {}",
                MAX_CAMERA_FPS,
                self.camera.fps
            ));
        }
        if self.detector.workers == 0 {
            return Err(anyhow!("detector workers must be greater than zero"));
        }
        if self.detector.queue_depth == 0 {
            return Err(anyhow!("detector queue depth must be greater than zero"));
        }
        if self.model.name.trim().is_empty() {
            return Err(anyhow!("model name must not be empty"));
        }
        if !(self.view.width.is_finite() && self.view.height.is_finite())
            || self.view.width <= 0.0
            || self.view.height <= 0.0
        {
            return Err(anyhow!(
                "view size must be positive, got {}x{}",
                self.view.width,
                self.view.height
            ));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            preset: self.camera.preset,
            pixel_format: self.camera.pixel_format,
            discard_late_frames: self.camera.discard_late_frames,
            ..SessionConfig::default()
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}
