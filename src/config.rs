//! # Runtime Configuration
//!
//! Environment-aware configuration for the service runtime. Values come from
//! built-in defaults, an optional config file, and `NETMUX_`-prefixed
//! environment variables, merged in that order. Loaded configurations are
//! validated before use so an inconsistent FPS range or a zero capacity
//! fails at load time rather than at the first service creation.

use crate::constants;
use crate::error::{NetmuxError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Runtime configuration shared by a service directory and its services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Lowest per-service frame rate accepted by `set_fps`.
    pub min_fps: u32,
    /// Highest per-service frame rate accepted by `set_fps`.
    pub max_fps: u32,
    /// Frame rate expected of freshly created engine drivers.
    pub default_fps: u32,
    /// Maximum number of live services in the directory.
    pub max_services: usize,
    /// Global ceiling on scheduler ticks per second.
    pub max_schedule_fps: u32,
    /// Poller count handed to the engine when starting a service.
    pub poller_count: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_fps: constants::MIN_SERVICE_FPS,
            max_fps: constants::MAX_SERVICE_FPS,
            default_fps: constants::DEFAULT_SERVICE_FPS,
            max_services: constants::MAX_SERVICE_COUNT,
            max_schedule_fps: constants::MAX_SERVICE_FPS,
            poller_count: constants::DEFAULT_POLLER_COUNT,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `config/netmux.*` (if present) and the
    /// `NETMUX_` environment, layered over the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from("config/netmux")
    }

    /// Load configuration from an explicit file path (extension optional),
    /// layered over the defaults and under the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().display().to_string();
        let merged = Config::builder()
            .add_source(Config::try_from(&RuntimeConfig::default())?)
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix("NETMUX").try_parsing(true))
            .build()?;

        let loaded: RuntimeConfig = merged.try_deserialize()?;
        loaded.validate()?;

        debug!(
            min_fps = loaded.min_fps,
            max_fps = loaded.max_fps,
            max_services = loaded.max_services,
            max_schedule_fps = loaded.max_schedule_fps,
            "Runtime configuration loaded"
        );
        Ok(loaded)
    }

    /// Check internal consistency of the configured values.
    pub fn validate(&self) -> Result<()> {
        if self.min_fps == 0 || self.min_fps > self.max_fps {
            return Err(NetmuxError::Config(config::ConfigError::Message(format!(
                "invalid fps range [{}, {}]",
                self.min_fps, self.max_fps
            ))));
        }
        if self.default_fps < self.min_fps || self.default_fps > self.max_fps {
            return Err(NetmuxError::Config(config::ConfigError::Message(format!(
                "default fps {} outside [{}, {}]",
                self.default_fps, self.min_fps, self.max_fps
            ))));
        }
        if self.max_services == 0 {
            return Err(NetmuxError::Config(config::ConfigError::Message(
                "max_services must be at least 1".to_string(),
            )));
        }
        if self.max_schedule_fps == 0 {
            return Err(NetmuxError::Config(config::ConfigError::Message(
                "max_schedule_fps must be at least 1".to_string(),
            )));
        }
        Ok(())
    }

    /// Minimum interval between scheduler ticks.
    pub(crate) fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.max_schedule_fps))
    }
}
