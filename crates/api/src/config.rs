//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::{Currency, OrderError};
use saga::SagaConfig;
use thiserror::Error;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid ORDER_CURRENCY: {0}")]
    Currency(#[from] OrderError),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on in-memory stores
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `ORDER_CURRENCY`: ISO 4217 code orders are priced in (default: `USD`)
/// - `RESERVE_MAX_ATTEMPTS`, `AUTHORIZE_MAX_ATTEMPTS`, `RELEASE_MAX_ATTEMPTS`,
///   `REMOTE_CALL_TIMEOUT_MS`: override the saga's retry defaults
///
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub currency: String,
    pub reserve_max_attempts: Option<u32>,
    pub authorize_max_attempts: Option<u32>,
    pub release_max_attempts: Option<u32>,
    pub remote_call_timeout: Option<Duration>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            currency: lookup("ORDER_CURRENCY").unwrap_or(defaults.currency),
            reserve_max_attempts: lookup("RESERVE_MAX_ATTEMPTS").and_then(|n| n.parse().ok()),
            authorize_max_attempts: lookup("AUTHORIZE_MAX_ATTEMPTS").and_then(|n| n.parse().ok()),
            release_max_attempts: lookup("RELEASE_MAX_ATTEMPTS").and_then(|n| n.parse().ok()),
            remote_call_timeout: parsed("REMOTE_CALL_TIMEOUT_MS").map(Duration::from_millis),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the saga configuration, applying any overrides.
    pub fn saga_config(&self) -> Result<SagaConfig, ConfigError> {
        let mut config = SagaConfig::default().with_currency(Currency::new(&self.currency)?);

        if let Some(attempts) = self.reserve_max_attempts {
            config.reserve = config.reserve.with_max_attempts(attempts);
        }
        if let Some(attempts) = self.authorize_max_attempts {
            config.authorize = config.authorize.with_max_attempts(attempts);
        }
        if let Some(attempts) = self.release_max_attempts {
            config.release = config.release.with_max_attempts(attempts);
        }
        if let Some(timeout) = self.remote_call_timeout {
            config = config.with_call_timeout(timeout);
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            currency: "USD".to_string(),
            reserve_max_attempts: None,
            authorize_max_attempts: None,
            release_max_attempts: None,
            remote_call_timeout: None,
        }
    }
}
