//! Configuration file parsing for the notes server.
//!
//! Loads the runtime environment, the gRPC listener settings and the
//! Prometheus endpoint port from a TOML file.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable consulted when no `--config` flag is given
pub const CONF_PATH_ENV: &str = "CONF_PATH";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// Unknown runtime environment
    #[error("Unknown environment '{0}', expected one of: local, dev, prod")]
    InvalidEnv(String),
}

/// Runtime environment, selects the log format and default level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Env {
    /// Human-readable logs at debug
    Local,
    /// JSON logs at debug
    Dev,
    /// JSON logs at info
    Prod,
}

impl FromStr for Env {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Env::Local),
            "dev" => Ok(Env::Dev),
            "prod" => Ok(Env::Prod),
            other => Err(ConfigError::InvalidEnv(other.to_string())),
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Env::Local => "local",
            Env::Dev => "dev",
            Env::Prod => "prod",
        })
    }
}

impl<'de> Deserialize<'de> for Env {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Server configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Runtime environment
    pub env: Env,

    /// Value of the constant `app` label on every metric series
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// gRPC listener settings
    pub grpc: GrpcConfig,

    /// Metrics and health endpoint settings
    pub prometheus: PrometheusConfig,
}

/// gRPC listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct GrpcConfig {
    /// Listen port
    pub port: u16,

    /// Listen address (default: 0.0.0.0)
    #[serde(default = "default_address")]
    pub address: String,

    /// Graceful shutdown deadline in seconds (default: 30)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

/// Metrics and health endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    /// Listen port
    pub port: u16,

    /// Listen address (default: 0.0.0.0)
    #[serde(default = "default_address")]
    pub address: String,
}

fn default_app_name() -> String {
    "notes_service".to_string()
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

/// Default shutdown deadline: 30 seconds
fn default_shutdown_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        contents.parse()
    }

    /// Graceful shutdown deadline for the gRPC server
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.grpc.shutdown_timeout_secs)
    }

    /// Full metrics endpoint bind address (address:port)
    pub fn prometheus_addr(&self) -> String {
        format!("{}:{}", self.prometheus.address, self.prometheus.port)
    }
}

impl FromStr for AppConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: AppConfig = toml::from_str(s)?;

        if config.app_name.is_empty() {
            return Err(ConfigError::MissingField("app_name".to_string()));
        }

        Ok(config)
    }
}
