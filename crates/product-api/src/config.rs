//! # API Configuration
//!
//! Environment-based configuration for the product API service.

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use product_domain::{DEFAULT_CACHE_TTL, DEFAULT_PROBE_WINDOW};
use product_persistence::{CacheConfig, PgMemberConfig, ReplicaFallback, StoreConfig};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
#[error("Invalid {var}='{value}': {reason}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
    pub reason: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub server_addr: SocketAddr,

    /// Logging level (used when `RUST_LOG` is unset)
    pub log_level: String,

    /// Logging output format
    pub log_format: LogFormat,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,

    /// Primary/replica PostgreSQL configuration
    pub store: StoreConfig,

    /// Redis configuration
    pub cache: CacheConfig,

    /// TTL of cache entries
    pub cache_ttl: Duration,

    /// Consistency probe window
    pub probe_window: Duration,

    /// Read policy when the replica is unreachable
    pub replica_fallback: ReplicaFallback,

    /// Create the products table on startup
    pub bootstrap_schema: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        let defaults = StoreConfig::default();
        let cache_defaults = CacheConfig::default();

        Ok(Self {
            server_addr: vars.parse("SERVER_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            log_level: vars.string("LOG_LEVEL", "info"),
            log_format: vars.parse("LOG_FORMAT", LogFormat::Json)?,
            cors_origins: vars
                .string("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),

            store: StoreConfig {
                primary: PgMemberConfig {
                    host: vars.string("PRIMARY_DB_HOST", &defaults.primary.host),
                    port: vars.parse("PRIMARY_DB_PORT", defaults.primary.port)?,
                },
                replica: PgMemberConfig {
                    host: vars.string("REPLICA_DB_HOST", &defaults.replica.host),
                    port: vars.parse("REPLICA_DB_PORT", defaults.replica.port)?,
                },
                dbname: vars.string("DB_NAME", &defaults.dbname),
                user: vars.string("DB_USER", &defaults.user),
                password: vars.string("DB_PASSWORD", &defaults.password),
                max_size: vars.parse("DB_POOL_MAX_SIZE", defaults.max_size)?,
                connect_timeout: vars.millis("DB_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
                wait_timeout: vars.millis("DB_POOL_WAIT_TIMEOUT_MS", defaults.wait_timeout)?,
                statement_timeout: vars
                    .millis("DB_STATEMENT_TIMEOUT_MS", defaults.statement_timeout)?,
            },

            cache: CacheConfig {
                url: vars.string("REDIS_URL", &cache_defaults.url),
                connect_timeout: vars
                    .millis("REDIS_CONNECT_TIMEOUT_MS", cache_defaults.connect_timeout)?,
                response_timeout: vars
                    .millis("REDIS_RESPONSE_TIMEOUT_MS", cache_defaults.response_timeout)?,
                retries: vars.parse("REDIS_RETRIES", cache_defaults.retries)?,
            },

            cache_ttl: Duration::from_secs(
                vars.parse("CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs())?,
            ),
            probe_window: vars.millis("PROBE_WINDOW_MS", DEFAULT_PROBE_WINDOW)?,
            replica_fallback: vars.parse("REPLICA_FALLBACK", ReplicaFallback::Primary)?,
            bootstrap_schema: vars.flag("BOOTSTRAP_SCHEMA", false),
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn string(&self, var: &str, default: &str) -> String {
        (self.0)(var).unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, var: &str, default: bool) -> bool {
        (self.0)(var).map_or(default, |v| v == "true" || v == "1")
    }

    fn parse<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match (self.0)(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError {
                var: var.to_string(),
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn millis(&self, var: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(var, default_ms).map(Duration::from_millis)
    }
}
