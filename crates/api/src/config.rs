//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::DEFAULT_PERSISTENCE_TIMEOUT;
use notifications::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PUSH_TIMEOUT};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: Postgres connection string; in-memory stores when unset
/// - `PERSISTENCE_TIMEOUT_MS`: bound on every store call (default 5000)
/// - `NOTIFY_TIMEOUT_MS`: bound on a single push to a connection (default 500)
/// - `NOTIFY_CHANNEL_CAPACITY`: queued notifications before drops (default 1024)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub persistence_timeout: Duration,
    pub notify_timeout: Duration,
    pub notify_channel_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            persistence_timeout: millis("PERSISTENCE_TIMEOUT_MS", defaults.persistence_timeout),
            notify_timeout: millis("NOTIFY_TIMEOUT_MS", defaults.notify_timeout),
            notify_channel_capacity: lookup("NOTIFY_CHANNEL_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.notify_channel_capacity),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
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
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
            notify_timeout: DEFAULT_PUSH_TIMEOUT,
            notify_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
