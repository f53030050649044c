//! Configuration file parsing and structures.
//!
//! tdble uses a single TOML file. Every section is optional; a missing section takes its
//! defaults.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use crate::device::AdvertisementFilter;
use crate::device::DEFAULT_DISCOVERY_MAX_ATTEMPTS;
use crate::device::DEFAULT_MAX_ATTEMPTS;
use crate::device::DEFAULT_UPDATE_TIMEOUT;
use crate::device::UpdaterOptions;

/// Seconds between two polls of the device.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 300;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub advertisement: AdvertisementFilter,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"tdble::device" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

/// The device to poll and how to poll it
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Bluetooth address, e.g. "C4:7F:51:0A:B2:3E"
    pub address: Option<String>,

    /// Keep the connection open between polls
    pub persistent: bool,

    pub update_interval_secs: u64,

    /// Deadline for reading the device once connected
    pub update_timeout_secs: u64,

    /// Attempts per update until the device has answered once
    pub discovery_max_attempts: u32,

    /// Attempts per update afterwards
    pub max_attempts: u32,

    /// How long to scan for a device that has not been seen yet
    pub locate_timeout_secs: u64,

    /// Length of the advertisement scan used by `scan`
    pub scan_duration_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            persistent: true,
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            update_timeout_secs: DEFAULT_UPDATE_TIMEOUT.as_secs(),
            discovery_max_attempts: DEFAULT_DISCOVERY_MAX_ATTEMPTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            locate_timeout_secs: 10,
            scan_duration_secs: 10,
        }
    }
}

impl DeviceConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn locate_timeout(&self) -> Duration {
        Duration::from_secs(self.locate_timeout_secs)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    /// Updater settings for discovering the device, before it has answered once.
    pub fn discovery_options(&self) -> UpdaterOptions {
        UpdaterOptions {
            max_attempts: self.discovery_max_attempts,
            update_timeout: Duration::from_secs(self.update_timeout_secs),
            persistent: self.persistent,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.device.update_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "device.update_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.device.update_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "device.update_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.device.discovery_max_attempts == 0 || self.device.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "device attempt limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
