//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("{0} must be set when STORE_BACKEND=postgres")]
    Missing(&'static str),
}

/// Which replica implementations the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Two in-memory replicas. State is lost on restart.
    #[default]
    Memory,
    /// Relational tables plus a JSONB document database.
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `STORE_BACKEND`: `memory` or `postgres` (default: `memory`)
/// - `RELATIONAL_DATABASE_URL`, `DOCUMENT_DATABASE_URL`: required for `postgres`
/// - `DB_MAX_CONNECTIONS`: pool size per replica (default: `5`)
/// - `REPLICATION_INTERVAL_SECS`: outbox replay period (default: `30`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub store_backend: StoreBackend,
    pub relational_database_url: Option<String>,
    pub document_database_url: Option<String>,
    pub db_max_connections: u32,
    pub replication_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's
    /// value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        let config = Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT")?.unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed(&lookup, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
            store_backend: parsed(&lookup, "STORE_BACKEND")?.unwrap_or(defaults.store_backend),
            relational_database_url: text("RELATIONAL_DATABASE_URL"),
            document_database_url: text("DOCUMENT_DATABASE_URL"),
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            replication_interval: parsed::<u64, _>(&lookup, "REPLICATION_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.replication_interval),
        };

        if config.store_backend == StoreBackend::Postgres {
            if config.relational_database_url.is_none() {
                return Err(ConfigError::Missing("RELATIONAL_DATABASE_URL"));
            }
            if config.document_database_url.is_none() {
                return Err(ConfigError::Missing("DOCUMENT_DATABASE_URL"));
            }
        }
        if config.replication_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "REPLICATION_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(config)
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).filter(|value| !value.trim().is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            store_backend: StoreBackend::Memory,
            relational_database_url: None,
            document_database_url: None,
            db_max_connections: 5,
            replication_interval: Duration::from_secs(30),
        }
    }
}
