//! Configuration system for the heartbeat service.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `HEARTBEAT_SERVER_HOST` - Server bind address
//! - `HEARTBEAT_SERVER_PORT` - Server port
//! - `HEARTBEAT_DATABASE_TYPE` - `sqlite` or `mysql`
//! - `HEARTBEAT_DATABASE_URL` - Database connection URL (routed by scheme)
//! - `HEARTBEAT_DATABASE_MAX_CONNECTIONS` - Pool size
//! - `HEARTBEAT_CLIENT_VERSION` - Client version accepted by `/heartbeat`
//! - `HEARTBEAT_VALIDATOR_PROXIES` - Comma separated outbound proxy URLs
//! - `HEARTBEAT_VALIDATOR_TIMEOUT_SECS` - Outbound request timeout
//! - `HEARTBEAT_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::builder::DefaultState;
use config::{Config, ConfigBuilder};
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{HeartbeatError, HeartbeatResult};

/// Global configuration singleton.
static CONFIG: OnceLock<HeartbeatConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub client: ClientConfig,
    pub heartbeat: HeartbeatTimingConfig,
    pub validator: ValidatorConfig,
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "mysql"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// MySQL connection URL
    pub mysql_url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://heartbeat.db".to_string(),
            mysql_url: "mysql://localhost/heartbeat".to_string(),
            max_connections: 10,
        }
    }
}

/// What the game client must send to be served.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub expected_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            expected_version: "0.1.1".to_string(),
        }
    }
}

/// Throttling intervals and jitter bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatTimingConfig {
    /// Minimum age of the last ticket heartbeat before a new ticket is requested
    pub ticket_interval_secs: u64,
    /// The entitlement heartbeat must be at least this old before a ticket is requested
    pub entitlement_gate_secs: u64,
    /// Minimum age of the last entitlement heartbeat before another is sent
    pub entitlement_interval_ms: u64,
    pub ticket_jitter_min_ms: u64,
    pub ticket_jitter_max_ms: u64,
    pub submit_jitter_min_ms: u64,
    pub submit_jitter_max_ms: u64,
}

impl Default for HeartbeatTimingConfig {
    fn default() -> Self {
        Self {
            ticket_interval_secs: 300,
            entitlement_gate_secs: 60,
            entitlement_interval_ms: 1000,
            ticket_jitter_min_ms: 750,
            ticket_jitter_max_ms: 3000,
            submit_jitter_min_ms: 200,
            submit_jitter_max_ms: 680,
        }
    }
}

impl HeartbeatTimingConfig {
    pub fn ticket_interval(&self) -> Duration {
        Duration::from_secs(self.ticket_interval_secs)
    }

    pub fn entitlement_gate(&self) -> Duration {
        Duration::from_secs(self.entitlement_gate_secs)
    }

    pub fn entitlement_interval(&self) -> Duration {
        Duration::from_millis(self.entitlement_interval_ms)
    }
}

/// Outbound validator endpoints and transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub ticket_url: String,
    pub entitlement_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// One pooled client per proxy; empty means a single direct client.
    pub proxies: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            ticket_url: "https://lambda.fivem.net/api/ticket/create".to_string(),
            entitlement_url: "https://lambda.fivem.net/api/validate/entitlement".to_string(),
            user_agent: "CitizenFX/1 (with adhesive; rel. 7194)".to_string(),
            timeout_secs: 10,
            proxies: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn config_error(e: config::ConfigError) -> HeartbeatError {
    HeartbeatError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> HeartbeatResult<ConfigBuilder<DefaultState>> {
    let defaults = HeartbeatConfig::default();
    let timing = &defaults.heartbeat;

    builder
        .set_default("server.host", defaults.server.host.clone())
        .and_then(|b| b.set_default("server.port", defaults.server.port as i64))
        .and_then(|b| b.set_default("database.db_type", defaults.database.db_type.clone()))
        .and_then(|b| b.set_default("database.sqlite_url", defaults.database.sqlite_url.clone()))
        .and_then(|b| b.set_default("database.mysql_url", defaults.database.mysql_url.clone()))
        .and_then(|b| {
            b.set_default(
                "database.max_connections",
                defaults.database.max_connections as i64,
            )
        })
        .and_then(|b| {
            b.set_default(
                "client.expected_version",
                defaults.client.expected_version.clone(),
            )
        })
        .and_then(|b| {
            b.set_default(
                "heartbeat.ticket_interval_secs",
                timing.ticket_interval_secs as i64,
            )
        })
        .and_then(|b| {
            b.set_default(
                "heartbeat.entitlement_gate_secs",
                timing.entitlement_gate_secs as i64,
            )
        })
        .and_then(|b| {
            b.set_default(
                "heartbeat.entitlement_interval_ms",
                timing.entitlement_interval_ms as i64,
            )
        })
        .and_then(|b| {
            b.set_default(
                "heartbeat.ticket_jitter_min_ms",
                timing.ticket_jitter_min_ms as i64,
            )
        })
        .and_then(|b| {
            b.set_default(
                "heartbeat.ticket_jitter_max_ms",
                timing.ticket_jitter_max_ms as i64,
            )
        })
        .and_then(|b| {
            b.set_default(
                "heartbeat.submit_jitter_min_ms",
                timing.submit_jitter_min_ms as i64,
            )
        })
        .and_then(|b| {
            b.set_default(
                "heartbeat.submit_jitter_max_ms",
                timing.submit_jitter_max_ms as i64,
            )
        })
        .and_then(|b| b.set_default("validator.ticket_url", defaults.validator.ticket_url.clone()))
        .and_then(|b| {
            b.set_default(
                "validator.entitlement_url",
                defaults.validator.entitlement_url.clone(),
            )
        })
        .and_then(|b| b.set_default("validator.user_agent", defaults.validator.user_agent.clone()))
        .and_then(|b| {
            b.set_default(
                "validator.timeout_secs",
                defaults.validator.timeout_secs as i64,
            )
        })
        .and_then(|b| b.set_default("validator.proxies", Vec::<String>::new()))
        .and_then(|b| b.set_default("logging.level", defaults.logging.level.clone()))
        .map_err(config_error)
}

impl HeartbeatConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> HeartbeatResult<Self> {
        let proxies: Option<Vec<String>> = env::var("HEARTBEAT_VALIDATOR_PROXIES").ok().map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        });

        let builder = with_defaults(Config::builder())?
            .add_source(config::File::with_name("config").required(false))
            .set_override_option("server.host", env::var("HEARTBEAT_SERVER_HOST").ok())
            .map_err(config_error)?
            .set_override_option(
                "server.port",
                env_parsed::<i64>("HEARTBEAT_SERVER_PORT"),
            )
            .map_err(config_error)?
            .set_override_option(
                "database.db_type",
                env::var("HEARTBEAT_DATABASE_TYPE").ok(),
            )
            .map_err(config_error)?
            .set_override_option(
                "database.sqlite_url",
                env::var("HEARTBEAT_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_error)?
            .set_override_option(
                "database.mysql_url",
                env::var("HEARTBEAT_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("mysql")),
            )
            .map_err(config_error)?
            .set_override_option(
                "database.max_connections",
                env_parsed::<i64>("HEARTBEAT_DATABASE_MAX_CONNECTIONS"),
            )
            .map_err(config_error)?
            .set_override_option(
                "client.expected_version",
                env::var("HEARTBEAT_CLIENT_VERSION").ok(),
            )
            .map_err(config_error)?
            .set_override_option("validator.proxies", proxies)
            .map_err(config_error)?
            .set_override_option(
                "validator.timeout_secs",
                env_parsed::<i64>("HEARTBEAT_VALIDATOR_TIMEOUT_SECS"),
            )
            .map_err(config_error)?
            .set_override_option("logging.level", env::var("HEARTBEAT_LOG_LEVEL").ok())
            .map_err(config_error)?;

        let settings = builder
            .build()
            .map_err(|e| HeartbeatError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| HeartbeatError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> HeartbeatResult<()> {
        if self.server.port == 0 {
            return Err(HeartbeatError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "mysql" => {}
            other => {
                return Err(HeartbeatError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'mysql', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(HeartbeatError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.client.expected_version.trim().is_empty() {
            return Err(HeartbeatError::ConfigError(
                "client.expected_version cannot be empty".to_string(),
            ));
        }

        let timing = &self.heartbeat;
        if timing.ticket_jitter_min_ms > timing.ticket_jitter_max_ms {
            return Err(HeartbeatError::ConfigError(
                "heartbeat.ticket_jitter_min_ms exceeds heartbeat.ticket_jitter_max_ms".to_string(),
            ));
        }
        if timing.submit_jitter_min_ms > timing.submit_jitter_max_ms {
            return Err(HeartbeatError::ConfigError(
                "heartbeat.submit_jitter_min_ms exceeds heartbeat.submit_jitter_max_ms".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(HeartbeatError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> HeartbeatResult<&'static HeartbeatConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = HeartbeatConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is valid.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| HeartbeatError::ConfigError("configuration was not stored".to_string()))
}
