//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `CAMERA_SERVER__*` environment variables
//! (e.g. `CAMERA_SERVER__EXPOSURE__GRACE_SECONDS=60`).

use camera_capture::{CameraIdentifier, SimulatedConfig};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use exposure_control::ControllerConfig;
use serde::Deserialize;
use std::time::Duration;

/// Config file used when neither a CLI argument nor `CAMERA_SERVER_CONFIG` is given
pub const DEFAULT_CONFIG_FILE: &str = "camera-server.toml";

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
    pub log: LogConfig,
    pub camera: CameraConfig,
    pub exposure: ExposureConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            log: LogConfig::default(),
            camera: CameraConfig::default(),
            exposure: ExposureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Maximum level: trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Which camera implementation to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraDriver {
    #[default]
    Simulated,
    Asi,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub driver: CameraDriver,
    /// Camera index or model name (ASI driver)
    pub identifier: CameraIdentifier,
    /// Sensor shape of the simulated driver
    pub simulated: SimulatedConfig,
}

/// Exposure timing knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    pub grace_seconds: f64,
    pub handoff_timeout_ms: u64,
    pub abort_timeout_ms: u64,
    pub min_poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            grace_seconds: defaults.grace.as_secs_f64(),
            handoff_timeout_ms: defaults.handoff_timeout.as_millis() as u64,
            abort_timeout_ms: defaults.abort_timeout.as_millis() as u64,
            min_poll_interval_ms: defaults.min_poll_interval.as_millis() as u64,
            max_poll_interval_ms: defaults.max_poll_interval.as_millis() as u64,
        }
    }
}

impl ExposureConfig {
    /// Convert into controller timings
    pub fn controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        let grace = Duration::try_from_secs_f64(self.grace_seconds).map_err(|_| {
            ConfigError::Message(format!(
                "exposure.grace_seconds must be a non-negative number, got {}",
                self.grace_seconds
            ))
        })?;
        if self.min_poll_interval_ms > self.max_poll_interval_ms {
            return Err(ConfigError::Message(format!(
                "exposure.min_poll_interval_ms ({}) exceeds max_poll_interval_ms ({})",
                self.min_poll_interval_ms, self.max_poll_interval_ms
            )));
        }

        Ok(ControllerConfig {
            grace,
            handoff_timeout: Duration::from_millis(self.handoff_timeout_ms),
            abort_timeout: Duration::from_millis(self.abort_timeout_ms),
            min_poll_interval: Duration::from_millis(self.min_poll_interval_ms),
            max_poll_interval: Duration::from_millis(self.max_poll_interval_ms),
        })
    }
}

impl ServerConfig {
    /// Load configuration from `path` (or the default locations) and the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var("CAMERA_SERVER_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        Self::build(
            Config::builder()
                .add_source(File::with_name(&path).required(false))
                .add_source(
                    Environment::with_prefix("CAMERA_SERVER")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.exposure.controller_config()?;
        Ok(config)
    }
}
