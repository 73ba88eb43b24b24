//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration.

use andar_bahar::db::DatabaseConfig;
use andar_bahar::table::TableConfig;
use std::net::SocketAddr;

/// Complete server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP/WebSocket bind address
    pub bind: SocketAddr,
    /// Prometheus exporter bind address, if metrics are enabled
    pub metrics_bind: Option<SocketAddr>,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Round cadence configuration
    pub table: TableConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// CLI arguments take precedence over the environment; anything unset
    /// falls back to the defaults.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:4000"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .map(|s| {
                s.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("not a socket address: {s}"),
                })
            })
            .transpose()?;

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let defaults = TableConfig::default();
        let table = TableConfig {
            name: std::env::var("TABLE_NAME").unwrap_or(defaults.name),
            lobby_seconds: parse_env_or("LOBBY_SECONDS", defaults.lobby_seconds),
            draw_interval_ms: parse_env_or("DRAW_INTERVAL_MS", defaults.draw_interval_ms),
            settle_seconds: parse_env_or("SETTLE_SECONDS", defaults.settle_seconds),
        };

        Ok(ServerConfig {
            bind,
            metrics_bind,
            database,
            table,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.lobby_seconds == 0 {
            return Err(ConfigError::Invalid {
                var: "LOBBY_SECONDS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.table.draw_interval_ms < 50 {
            return Err(ConfigError::Invalid {
                var: "DRAW_INTERVAL_MS".to_string(),
                reason: "Must be at least 50".to_string(),
            });
        }

        if self.table.settle_seconds == 0 {
            return Err(ConfigError::Invalid {
                var: "SETTLE_SECONDS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingRequired { var: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
