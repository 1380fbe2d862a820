//! Engine configuration loading and representation.
//!
//! Values come from the environment (`EngineConfig::from_env`) or a JSON file
//! (`EngineConfig::from_json_str`); anything missing falls back to defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetstock_core::Money;
use fleetstock_observability::{LogConfig, LogFormat};

pub const ENV_LOG_LEVEL: &str = "FLEETSTOCK_LOG";
pub const ENV_LOG_FORMAT: &str = "FLEETSTOCK_LOG_FORMAT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Factor between major and minor currency units; only 100 is supported.
    pub minor_units_per_major: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            minor_units_per_major: Money::MINOR_PER_MAJOR,
        }
    }
}

impl EngineConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();

        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            config.log_level = level.trim().to_string();
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.log_format = format.parse().map_err(|e: fleetstock_observability::ParseLogFormatError| {
                ConfigError::InvalidValue {
                    key: ENV_LOG_FORMAT,
                    message: e.to_string(),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minor_units_per_major != Money::MINOR_PER_MAJOR {
            return Err(ConfigError::InvalidValue {
                key: "minor_units_per_major",
                message: format!(
                    "only {} is supported, got {}",
                    Money::MINOR_PER_MAJOR,
                    self.minor_units_per_major
                ),
            });
        }
        Ok(())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}
