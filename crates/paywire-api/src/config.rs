//! Configuration management for the paywire services.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use paywire_worker::WorkerConfig;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Legacy environment name for the database URL.
const DB_URL_ENV: &str = "db_url";

/// Service configuration shared by the server, the worker pool and the load
/// simulator.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Environment variables use the upper-cased field name, so
/// `worker_poll_interval_ms` is set with `WORKER_POLL_INTERVAL_MS`.
/// `DB_URL` is accepted as an alternative to `DATABASE_URL`.
///
/// # Example
///
/// ```no_run
/// use paywire_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL` or `DB_URL`
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    /// Minimum number of connections to maintain in the pool.
    ///
    /// Environment variable: `DATABASE_MIN_CONNECTIONS`
    #[serde(default = "default_min_connections")]
    pub database_min_connections: u32,
    /// Database connection acquire timeout in seconds.
    ///
    /// Environment variable: `DATABASE_CONNECTION_TIMEOUT`
    #[serde(default = "default_acquire_timeout")]
    pub database_connection_timeout: u64,
    /// Database connection idle timeout in seconds.
    ///
    /// Environment variable: `DATABASE_IDLE_TIMEOUT`
    #[serde(default = "default_idle_timeout")]
    pub database_idle_timeout: u64,
    /// Maximum lifetime of database connections in seconds.
    ///
    /// Environment variable: `DATABASE_MAX_LIFETIME`
    #[serde(default = "default_max_lifetime")]
    pub database_max_lifetime: u64,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    // Worker pool
    /// Number of concurrent workers.
    ///
    /// Environment variable: `WORKER_POOL_SIZE`
    #[serde(default = "default_worker_count")]
    pub worker_pool_size: usize,
    /// Wait after an empty claim in milliseconds.
    ///
    /// Environment variable: `WORKER_POLL_INTERVAL_MS`
    #[serde(default = "default_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,
    /// Simulated processing time per event in milliseconds.
    ///
    /// Environment variable: `WORKER_PROCESS_DELAY_MS`
    #[serde(default = "default_process_delay_ms")]
    pub worker_process_delay_ms: u64,
    /// Upper bound for graceful pool shutdown in milliseconds.
    ///
    /// Environment variable: `WORKER_SHUTDOWN_TIMEOUT_MS`
    #[serde(default = "default_shutdown_timeout_ms")]
    pub worker_shutdown_timeout_ms: u64,

    // Load simulator
    /// Base URL the load simulator posts webhooks to.
    ///
    /// Environment variable: `LOADSIM_BASE_URL`
    #[serde(default = "default_loadsim_base_url")]
    pub loadsim_base_url: String,

    // Logging
    /// Log filter directives.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the merged values
    /// fail validation.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("").map(|key| {
                if key.as_str().eq_ignore_ascii_case(DB_URL_ENV) {
                    "database_url".into()
                } else {
                    key.into()
                }
            }));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the worker pool configuration.
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_count: self.worker_pool_size,
            poll_interval: Duration::from_millis(self.worker_poll_interval_ms),
            process_delay: Duration::from_millis(self.worker_process_delay_ms),
            shutdown_timeout: Duration::from_millis(self.worker_shutdown_timeout_ms),
        }
    }

    /// HTTP request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        let userinfo_start = self.database_url.find("://").map_or(0, |pos| pos + 3);
        let rest = &self.database_url[userinfo_start..];

        if let Some(at_pos) = rest.find('@') {
            if let Some(colon_pos) = rest[..at_pos].find(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(
                    userinfo_start + colon_pos + 1..userinfo_start + at_pos,
                    "***",
                );
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("database_url must not be empty");
        }

        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database min_connections cannot exceed max_connections");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        self.to_worker_config().validate().context("invalid worker pool configuration")?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            database_min_connections: default_min_connections(),
            database_connection_timeout: default_acquire_timeout(),
            database_idle_timeout: default_idle_timeout(),
            database_max_lifetime: default_max_lifetime(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            worker_pool_size: default_worker_count(),
            worker_poll_interval_ms: default_poll_interval_ms(),
            worker_process_delay_ms: default_process_delay_ms(),
            worker_shutdown_timeout_ms: default_shutdown_timeout_ms(),
            loadsim_base_url: default_loadsim_base_url(),
            rust_log: default_log_level(),
        }
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/paywire".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3333
}

fn default_request_timeout() -> u64 {
    30
}

fn default_worker_count() -> usize {
    paywire_worker::DEFAULT_WORKER_COUNT
}

fn default_poll_interval_ms() -> u64 {
    millis(paywire_worker::DEFAULT_POLL_INTERVAL)
}

fn default_process_delay_ms() -> u64 {
    millis(paywire_worker::DEFAULT_PROCESS_DELAY)
}

fn default_shutdown_timeout_ms() -> u64 {
    millis(paywire_worker::DEFAULT_SHUTDOWN_TIMEOUT)
}

fn default_loadsim_base_url() -> String {
    "http://localhost:3333".to_string()
}

fn default_log_level() -> String {
    "info,paywire=debug,tower_http=debug".to_string()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
