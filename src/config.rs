//! On-disk configuration
//!
//! Stored as TOML under the user's config directory. A missing file is
//! replaced by the defaults, which reproduce the plain demo: I2C bus 1,
//! 10 s windows sampled every 100 ms, 5 s settle delay, 10 s startup delay.

use crate::controller::ControllerSettings;
use crate::sensor::registers::{self, Bandwidth};
use crate::sensor::DriverTiming;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn, Level};

const CONFIG_DIR: &str = "magcal";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    /// Number N of `/dev/i2c-N`
    pub i2c_bus: u8,
    pub address: u16,
    pub bandwidth: Bandwidth,
    pub set_reset_settle_ms: u64,
    pub measurement_poll_ms: u64,
    pub measurement_max_polls: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        let timing = DriverTiming::default();
        Self {
            i2c_bus: 1,
            address: registers::I2C_ADDRESS,
            bandwidth: Bandwidth::default(),
            set_reset_settle_ms: timing.set_reset_settle.as_millis() as u64,
            measurement_poll_ms: timing.measurement_poll.as_millis() as u64,
            measurement_max_polls: timing.max_polls,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub sample_window_ms: u64,
    pub sample_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub startup_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let settings = ControllerSettings::default();
        Self {
            sample_window_ms: settings.sample_window.as_millis() as u64,
            sample_interval_ms: settings.sample_interval.as_millis() as u64,
            settle_delay_ms: settings.settle_delay.as_millis() as u64,
            startup_delay_ms: settings.startup_delay.as_millis() as u64,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Unknown log level: {0}")]
    UnknownLogLevel(String),
}

impl Config {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads `path`, writing the defaults there first if it does not exist.
    ///
    /// Filesystem failures fall back to the defaults; a file that exists but
    /// does not parse or validate is an error.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        let exists = match tokio::fs::try_exists(path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    "Failed to check if config file {} exists, using defaults: {}",
                    path.display(),
                    e
                );
                return Ok(Config::default());
            }
        };

        if !exists {
            info!("No config at {}, creating default", path.display());
            let config = Config::default();
            if let Err(e) = config.save(path).await {
                warn!("Could not write default config, continuing without it: {}", e);
            }
            return Ok(config);
        }

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Failed to read config file {}, using defaults: {}",
                    path.display(),
                    e
                );
                return Ok(Config::default());
            }
        };
        let config = Self::parse(&content)?;
        debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        Ok(())
    }

    /// Parses and validates TOML; absent keys fall back to their defaults
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.sample_window_ms == 0 {
            return Err(ConfigError::ZeroDuration("timing.sample_window_ms"));
        }
        if self.timing.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("timing.sample_interval_ms"));
        }
        if self.sensor.measurement_max_polls == 0 {
            return Err(ConfigError::ZeroDuration("sensor.measurement_max_polls"));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.logging
            .level
            .parse()
            .map_err(|_| ConfigError::UnknownLogLevel(self.logging.level.clone()))
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            sample_window: Duration::from_millis(self.timing.sample_window_ms),
            sample_interval: Duration::from_millis(self.timing.sample_interval_ms),
            settle_delay: Duration::from_millis(self.timing.settle_delay_ms),
            startup_delay: Duration::from_millis(self.timing.startup_delay_ms),
        }
    }

    pub fn driver_timing(&self) -> DriverTiming {
        DriverTiming {
            set_reset_settle: Duration::from_millis(self.sensor.set_reset_settle_ms),
            measurement_poll: Duration::from_millis(self.sensor.measurement_poll_ms),
            max_polls: self.sensor.measurement_max_polls,
            ..DriverTiming::default()
        }
    }
}
