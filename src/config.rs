use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_LOCATION_CODE: &str = "DEFAULT";
const DEFAULT_BATCH_PREFIX: &str = "BATCH";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;

/// Application configuration with validation.
///
/// Beyond environment/logging, this carries the operational knobs of the
/// receiving workflow: which location code counts as the system default
/// and how auto-created batch numbers are prefixed.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Location code (and name) treated as the system default when a
    /// receipt line omits a location
    #[serde(default = "default_location_code")]
    #[validate(length(min = 1))]
    pub default_location_code: String,

    /// Prefix for auto-generated batch numbers
    #[serde(default = "default_batch_prefix")]
    #[validate(length(min = 1))]
    pub batch_number_prefix: String,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_location_code() -> String {
    DEFAULT_LOCATION_CODE.to_string()
}

fn default_batch_prefix() -> String {
    DEFAULT_BATCH_PREFIX.to_string()
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            default_location_code: default_location_code(),
            batch_number_prefix: default_batch_prefix(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (STOCKROOM__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("default_location_code", DEFAULT_LOCATION_CODE)?
        .set_default("batch_number_prefix", DEFAULT_BATCH_PREFIX)?
        .set_default("event_channel_capacity", DEFAULT_EVENT_CHANNEL_CAPACITY as i64)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("STOCKROOM").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_location_code, "DEFAULT");
        assert_eq!(config.batch_number_prefix, "BATCH");
    }

    #[test]
    fn rejects_empty_location_code() {
        let config = AppConfig {
            default_location_code: String::new(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
