use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::path::Path;

use crate::frame::Zone;

const MAX_FPS: f64 = 120.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// URL returning a single still image (JPEG/PNG) per request.
    pub url: String,
    #[serde(default = "default_frame_width")]
    pub width: u32,
    #[serde(default = "default_frame_height")]
    pub height: u32,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Tick rate of the processing loop.
    #[serde(default = "default_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Initial zone; may be replaced or cleared through the control API.
    #[serde(default)]
    pub zone: Option<Zone>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlsConfig {
    #[serde(default = "default_true")]
    pub alarm_enabled: bool,
    #[serde(default = "default_true")]
    pub logging_enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlarmConfig {
    /// Player executable, e.g. `aplay`. Without one the alarm is silent.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// chrono format string for the human-readable log timestamp.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Keep the raw RGB samples alongside the PNG snapshot.
    #[serde(default)]
    pub keep_raw: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub url: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Snapshots waiting for upload; further events are dropped while full.
    #[serde(default = "default_upload_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            zone: None,
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            alarm_enabled: true,
            logging_enabled: true,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            timestamp_format: default_timestamp_format(),
            keep_raw: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.monitor.fps > 0.0 && self.monitor.fps <= MAX_FPS) {
            return Err(ConfigError::Invalid(format!(
                "monitor.fps must be in (0, {MAX_FPS}], got {}",
                self.monitor.fps
            )));
        }
        if self.detection.threshold.is_nan() || self.detection.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detection.threshold must be non-negative, got {}",
                self.detection.threshold
            )));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::Invalid(
                "source.width and source.height must be non-zero".into(),
            ));
        }
        if self.notify.upload.as_ref().is_some_and(|u| u.queue_depth == 0) {
            return Err(ConfigError::Invalid(
                "notify.upload.queue_depth must be at least 1".into(),
            ));
        }
        if StrftimeItems::new(&self.recorder.timestamp_format)
            .any(|item| matches!(item, Item::Error))
        {
            return Err(ConfigError::Invalid(format!(
                "recorder.timestamp_format is not a valid chrono format: {}",
                self.recorder.timestamp_format
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_frame_width() -> u32 {
    640
}
fn default_frame_height() -> u32 {
    480
}
fn default_request_timeout() -> u64 {
    5
}
fn default_upload_queue_depth() -> usize {
    16
}
fn default_fps() -> f64 {
    10.0
}
fn default_threshold() -> f64 {
    20.0
}
fn default_true() -> bool {
    true
}
fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S".into()
}
fn default_bind() -> String {
    "0.0.0.0:8080".into()
}
fn default_log_level() -> String {
    "info".into()
}
