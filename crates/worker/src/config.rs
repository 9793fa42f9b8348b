//! Worker configuration loaded from environment variables.

use std::time::Duration;

use event_bus::BrokerConfig;

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: ops endpoint bind address (default: `"0.0.0.0"` / `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL event store; in-memory when unset
/// - `BROKER_URL`, `BROKER_EXCHANGE`, `BROKER_EXCHANGE_TYPE`, `BROKER_QUEUE`,
///   `BROKER_ROUTING_KEY`: durable transport topology
/// - `RKH_APPROVAL_THRESHOLD`: multisig approvals needed (default: `2`)
/// - `RKH_POLL_INTERVAL_SECS`: approvals polling period (default: `30`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub broker: BrokerConfig,
    pub rkh_approval_threshold: u32,
    pub rkh_poll_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let broker_defaults = defaults.broker.clone();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            broker: BrokerConfig {
                url: lookup("BROKER_URL").unwrap_or(broker_defaults.url),
                exchange: lookup("BROKER_EXCHANGE").unwrap_or(broker_defaults.exchange),
                exchange_type: lookup("BROKER_EXCHANGE_TYPE")
                    .unwrap_or(broker_defaults.exchange_type),
                queue: lookup("BROKER_QUEUE").unwrap_or(broker_defaults.queue),
                routing_key: lookup("BROKER_ROUTING_KEY").unwrap_or(broker_defaults.routing_key),
            },
            rkh_approval_threshold: lookup("RKH_APPROVAL_THRESHOLD")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.rkh_approval_threshold),
            rkh_poll_interval: lookup("RKH_POLL_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.rkh_poll_interval),
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
            broker: BrokerConfig::default(),
            rkh_approval_threshold: 2,
            rkh_poll_interval: Duration::from_secs(30),
        }
    }
}
