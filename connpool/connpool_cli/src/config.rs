//! Application configuration.
//!
//! Settings are read from a TOML file. Every key is required and may be written
//! either as a dotted key (`pool.size = 3`) or as nested tables. Values may be
//! integers or strings holding an integer, so files converted from a
//! properties layout keep working.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use toml::{Table, Value};
use tracing::info;

/// Default configuration file, resolved against the working directory
pub const DEFAULT_CONFIG_PATH: &str = "app.toml";

const POOL_SIZE: &str = "pool.size";
const CLIENTS_COUNT: &str = "clients.count";
const ACQUIRE_TIMEOUT_MS: &str = "acquire.timeout.ms";
const QUERY_TIME_MIN_MS: &str = "query.time.ms.min";
const QUERY_TIME_MAX_MS: &str = "query.time.ms.max";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// File that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The content is not valid TOML
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required key is absent or blank
    #[error("missing required property: {0}")]
    Missing(&'static str),

    /// A key holds something other than an integer
    #[error("property {key} is not an integer: {value}")]
    InvalidValue {
        /// Offending key
        key: &'static str,
        /// Value as written in the file
        value: String,
    },

    /// Values parse but are out of range or inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validated application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    /// Number of connections in the pool
    pub pool_size: usize,

    /// Number of clients to run
    pub clients_count: usize,

    /// How long a client waits for a connection
    pub acquire_timeout_ms: u64,

    /// Shortest simulated query
    pub query_time_min_ms: u64,

    /// Longest simulated query
    pub query_time_max_ms: u64,
}

impl AppConfig {
    /// Load and validate configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let table: Table = content.parse()?;

        let pool_size = require_int(&table, POOL_SIZE)?;
        let clients_count = require_int(&table, CLIENTS_COUNT)?;
        let acquire_timeout_ms = require_int(&table, ACQUIRE_TIMEOUT_MS)?;
        let min_ms = require_int(&table, QUERY_TIME_MIN_MS)?;
        let max_ms = require_int(&table, QUERY_TIME_MAX_MS)?;

        if pool_size <= 0 || clients_count <= 0 {
            return Err(ConfigError::Invalid(format!(
                "{} and {} must be > 0",
                POOL_SIZE, CLIENTS_COUNT
            )));
        }
        if acquire_timeout_ms < 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be >= 0",
                ACQUIRE_TIMEOUT_MS
            )));
        }
        if min_ms < 0 || max_ms < min_ms {
            return Err(ConfigError::Invalid(format!(
                "query time range {}..={} is invalid",
                min_ms, max_ms
            )));
        }

        // All values are non-negative past this point.
        Ok(Self {
            pool_size: to_unsigned(pool_size, POOL_SIZE)?,
            clients_count: to_unsigned(clients_count, CLIENTS_COUNT)?,
            acquire_timeout_ms: acquire_timeout_ms as u64,
            query_time_min_ms: min_ms as u64,
            query_time_max_ms: max_ms as u64,
        })
    }

    /// Acquire timeout as a `Duration`
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Find `key` either as a literal top-level key or as a dotted table path.
fn lookup<'a>(table: &'a Table, key: &str) -> Option<&'a Value> {
    if let Some(value) = table.get(key) {
        return Some(value);
    }

    let mut parts = key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn require_int(table: &Table, key: &'static str) -> Result<i64, ConfigError> {
    match lookup(table, key) {
        None => Err(ConfigError::Missing(key)),
        Some(Value::Integer(i)) => Ok(*i),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ConfigError::Missing(key)),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: s.clone(),
        }),
        Some(other) => Err(ConfigError::InvalidValue {
            key,
            value: other.to_string(),
        }),
    }
}

fn to_unsigned(value: i64, key: &'static str) -> Result<usize, ConfigError> {
    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
pool.size = 3
clients.count = 12
acquire.timeout.ms = 2000
query.time.ms.min = 100
query.time.ms.max = 300
"#;

    #[test]
    fn test_parse_dotted_keys() {
        let config = AppConfig::parse(VALID).unwrap();

        assert_eq!(config.pool_size, 3);
        assert_eq!(config.clients_count, 12);
        assert_eq!(config.acquire_timeout(), Duration::from_secs(2));
        assert_eq!(config.query_time_min_ms, 100);
        assert_eq!(config.query_time_max_ms, 300);
    }

    #[test]
    fn test_parse_nested_tables_and_strings() {
        let content = r#"
"pool.size" = " 4 "

[clients]
count = "8"

[acquire.timeout]
ms = 0

[query.time.ms]
min = 5
max = 5
"#;
        let config = AppConfig::parse(content).unwrap();

        assert_eq!(config.pool_size, 4);
        assert_eq!(config.clients_count, 8);
        assert_eq!(config.acquire_timeout_ms, 0);
        assert_eq!(config.query_time_min_ms, config.query_time_max_ms);
    }

    #[test]
    fn test_missing_key_is_reported() {
        let content = VALID.replace("clients.count = 12\n", "");
        let err = AppConfig::parse(&content).unwrap_err();

        assert!(matches!(err, ConfigError::Missing("clients.count")));
        assert_eq!(err.to_string(), "missing required property: clients.count");
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let content = VALID.replace("pool.size = 3", "pool.size = \"  \"");
        let err = AppConfig::parse(&content).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("pool.size")));
    }

    #[test]
    fn test_non_integer_value_is_rejected() {
        let content = VALID.replace("acquire.timeout.ms = 2000", "acquire.timeout.ms = \"soon\"");
        let err = AppConfig::parse(&content).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "acquire.timeout.ms",
                ..
            }
        ));

        let content = VALID.replace("pool.size = 3", "pool.size = 2.5");
        assert!(matches!(
            AppConfig::parse(&content),
            Err(ConfigError::InvalidValue { key: "pool.size", .. })
        ));
    }

    #[test]
    fn test_sizes_must_be_positive() {
        let content = VALID.replace("pool.size = 3", "pool.size = 0");
        assert!(matches!(
            AppConfig::parse(&content),
            Err(ConfigError::Invalid(_))
        ));

        let content = VALID.replace("clients.count = 12", "clients.count = -1");
        assert!(matches!(
            AppConfig::parse(&content),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_negative_timeout_is_rejected() {
        let content = VALID.replace("acquire.timeout.ms = 2000", "acquire.timeout.ms = -5");
        assert!(matches!(
            AppConfig::parse(&content),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_inverted_query_range_is_rejected() {
        let content = VALID.replace("query.time.ms.max = 300", "query.time.ms.max = 50");
        let err = AppConfig::parse(&content).unwrap_err();
        assert!(err.to_string().contains("100..=50"));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        assert!(matches!(
            AppConfig::parse("pool.size = ="),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.pool_size, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/connpool/app.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
