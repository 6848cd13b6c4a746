use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::error::{GateError, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub access: AccessConfig,
    pub camera: CameraConfig,
    pub channel: ChannelConfig,
    pub gallery: GalleryConfig,
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

/// How detections in one frame turn into actuator commands.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One command per detection, in detection order.
    #[default]
    PerDetection,
    /// One command per frame that has at least one detection.
    PerFrame,
}

impl std::str::FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "per_detection" | "per-detection" => Ok(DispatchMode::PerDetection),
            "per_frame" | "per-frame" => Ok(DispatchMode::PerFrame),
            other => Err(format!(
                "unknown dispatch mode '{}', expected per_detection or per_frame", other
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessConfig {
    pub authorized_identity: String,
    #[serde(default)]
    pub dispatch: DispatchMode,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// Device index ("0"), device path ("/dev/video2") or "auto".
    #[serde(default = "default_camera_source")]
    pub source: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_ms: u64,
}

fn default_camera_source() -> String { "0".to_string() }
fn default_warmup_frames() -> u32 { 5 }
fn default_warmup_delay() -> u64 { 50 }
fn default_capture_timeout() -> u64 { 1000 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,
}

fn default_baud_rate() -> u32 { 9600 }
fn default_settle() -> u64 { 2000 }
fn default_send_timeout() -> u64 { 300 }
fn default_failure_threshold() -> u32 { 5 }
fn default_probe_interval() -> u64 { 5000 }

impl ChannelConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Bound for a link probe: reopening waits out the settle delay before
    /// the port is usable.
    pub fn probe_timeout(&self) -> Duration {
        self.settle_delay() + self.send_timeout()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GalleryConfig {
    pub images_dir: PathBuf,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool { true }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_input")]
    pub input_width: u32,
    #[serde(default = "default_detector_input")]
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub confidence: f32,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
}

fn default_detector_input() -> u32 { 640 }
fn default_detection_confidence() -> f32 { 0.5 }
fn default_max_faces() -> usize { 5 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_detector_input(),
            input_height: default_detector_input(),
            confidence: default_detection_confidence(),
            max_faces: default_max_faces(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default = "default_recognizer_input")]
    pub input_size: u32,
    #[serde(default = "default_normalization")]
    pub normalization_value: f32,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
}

fn default_recognizer_input() -> u32 { 112 }
fn default_normalization() -> f32 { 127.5 }
fn default_match_threshold() -> f32 { 0.5 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: default_recognizer_input(),
            normalization_value: default_normalization(),
            match_threshold: default_match_threshold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PreviewConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ascii_width: Option<usize>,
    #[serde(default)]
    pub ascii_height: Option<usize>,
}

impl Config {
    /// Loads from `configs/facegate.toml`, falling back to the user config dir.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("configs/facegate.toml");
        if local.exists() {
            return Self::load_from_path(&local);
        }
        Self::load_from_path(&crate::common::paths::user_config_file())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GateError::Config(format!(
                "Config file not found: {}. Please create it from configs/facegate.example.toml.",
                path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| GateError::Config(format!("Config parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.access.authorized_identity.is_empty() {
            return Err(GateError::Config("authorized_identity must not be empty".into()));
        }

        if self.camera.source.trim().is_empty() {
            return Err(GateError::Config("Camera source must not be empty".into()));
        }
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(GateError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(GateError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.channel.port.trim().is_empty() {
            return Err(GateError::Config("Channel port must not be empty".into()));
        }
        if self.channel.send_timeout_ms == 0 || self.channel.send_timeout_ms > 10_000 {
            return Err(GateError::Config(format!(
                "Send timeout must be between 1 and 10000 ms, got {}",
                self.channel.send_timeout_ms
            )));
        }
        if self.channel.failure_threshold == 0 {
            return Err(GateError::Config("Failure threshold must be at least 1".into()));
        }

        if self.detector.confidence < 0.0 || self.detector.confidence > 1.0 {
            return Err(GateError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence
            )));
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096
            || self.detector.input_height == 0 || self.detector.input_height > 4096
        {
            return Err(GateError::Config(format!(
                "Detector input must be between 1 and 4096, got {}x{}",
                self.detector.input_width, self.detector.input_height
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(GateError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }
        if self.recognizer.match_threshold < -1.0 || self.recognizer.match_threshold > 1.0 {
            return Err(GateError::Config(format!(
                "Match threshold must be between -1.0 and 1.0, got {}",
                self.recognizer.match_threshold
            )));
        }

        Ok(())
    }
}
