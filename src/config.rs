use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::pipeline::{ModelSpace, SchedulerConfig};
use crate::transport::SyntheticConfig;

const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 500;
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_SIGNALING_URL: &str = "stub://signaling";
const DEFAULT_MODEL_WIDTH: f32 = 640.0;
const DEFAULT_MODEL_HEIGHT: f32 = 640.0;
const DEFAULT_SYNTHETIC_WIDTH: u32 = 640;
const DEFAULT_SYNTHETIC_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    detection: Option<DetectionConfigFile>,
    connection: Option<ConnectionConfigFile>,
    model_space: Option<ModelSpaceConfigFile>,
    synthetic: Option<SyntheticConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    sample_interval_ms: Option<u64>,
    inference_timeout_ms: Option<u64>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ConnectionConfigFile {
    retry_delay_ms: Option<u64>,
    signaling_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelSpaceConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SyntheticConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

/// Runtime settings for one pipeline.
///
/// Sources, lowest precedence first: built-in defaults, the JSON file named by
/// `LIVEVIEW_CONFIG`, then `LIVEVIEW_*` environment overrides.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_interval: Duration,
    pub inference_timeout: Duration,
    pub detection_enabled: bool,
    pub retry_delay: Duration,
    pub signaling_url: String,
    pub model_space: ModelSpace,
    pub synthetic_width: u32,
    pub synthetic_height: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Defaults are always valid.
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVEVIEW_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sample_interval: self.sample_interval,
            inference_timeout: self.inference_timeout,
        }
    }

    pub fn synthetic_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            width: self.synthetic_width,
            height: self.synthetic_height,
            signaling_url: self.signaling_url.clone(),
            ..SyntheticConfig::default()
        }
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let connection = file.connection.unwrap_or_default();
        let model_space = file.model_space.unwrap_or_default();
        let synthetic = file.synthetic.unwrap_or_default();
        Self {
            sample_interval: Duration::from_millis(
                detection
                    .sample_interval_ms
                    .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS),
            ),
            inference_timeout: Duration::from_millis(
                detection
                    .inference_timeout_ms
                    .unwrap_or(DEFAULT_INFERENCE_TIMEOUT_MS),
            ),
            detection_enabled: detection.enabled.unwrap_or(true),
            retry_delay: Duration::from_millis(
                connection.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
            signaling_url: connection
                .signaling_url
                .unwrap_or_else(|| DEFAULT_SIGNALING_URL.to_string()),
            model_space: ModelSpace {
                width: model_space.width.unwrap_or(DEFAULT_MODEL_WIDTH),
                height: model_space.height.unwrap_or(DEFAULT_MODEL_HEIGHT),
            },
            synthetic_width: synthetic.width.unwrap_or(DEFAULT_SYNTHETIC_WIDTH),
            synthetic_height: synthetic.height.unwrap_or(DEFAULT_SYNTHETIC_HEIGHT),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(ms) = env_millis("LIVEVIEW_SAMPLE_INTERVAL_MS")? {
            self.sample_interval = ms;
        }
        if let Some(ms) = env_millis("LIVEVIEW_INFERENCE_TIMEOUT_MS")? {
            self.inference_timeout = ms;
        }
        if let Some(ms) = env_millis("LIVEVIEW_RETRY_DELAY_MS")? {
            self.retry_delay = ms;
        }
        if let Ok(enabled) = std::env::var("LIVEVIEW_DETECTION_ENABLED") {
            self.detection_enabled = parse_bool(&enabled).ok_or_else(|| {
                anyhow!("LIVEVIEW_DETECTION_ENABLED must be true/false (got {enabled:?})")
            })?;
        }
        if let Ok(url) = std::env::var("LIVEVIEW_SIGNALING_URL") {
            if !url.trim().is_empty() {
                self.signaling_url = url;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sample_interval.is_zero() {
            return Err(anyhow!("detection sample interval must be greater than zero"));
        }
        if self.inference_timeout.is_zero() {
            return Err(anyhow!("inference timeout must be greater than zero"));
        }
        if !(self.model_space.width > 0.0 && self.model_space.height > 0.0) {
            return Err(anyhow!(
                "model space must be positive (got {}x{})",
                self.model_space.width,
                self.model_space.height
            ));
        }
        if self.signaling_url.trim().is_empty() {
            return Err(anyhow!("signaling url must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{key} must be an integer number of milliseconds"))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        _ => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
