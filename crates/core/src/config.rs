//! Configuration loader for the message relay
//!
//! Environment-variable driven configuration with a `MESSAGE_RELAY_` prefix,
//! unprefixed fallbacks for the common keys (`DATABASE_URL`, `REDIS_URL`,
//! `PORT`), `.env` support via dotenvy, and validation with error messages
//! that name the offending key. The resolved configuration is loaded once in
//! `main` and passed down by value; nothing reads the environment after
//! startup.

use crate::error::RelayError;
use std::time::Duration;
use url::Url;

/// Configuration loader trait
///
/// Standardized `from_env()` + `validate()` pair implemented by every
/// configuration struct.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables.
    fn from_env() -> Result<Self, RelayError>;

    /// Validate configuration values.
    fn validate(&self) -> Result<(), RelayError>;
}

/// Which connection-registry backend the process runs against.
///
/// Resolved once at startup; switching backends requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Durable table backend (PostgreSQL).
    Postgres,
    /// Distributed cache backend (Redis).
    Redis,
    /// In-memory backend for tests and local development.
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::Redis => "redis",
            BackendKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(BackendKind::Postgres),
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            other => Err(RelayError::ConfigurationError {
                message: format!(
                    "Unknown backend '{}'. Must be one of: postgres, redis, memory",
                    other
                ),
                key: Some("MESSAGE_RELAY_BACKEND".to_string()),
            }),
        }
    }
}

/// Service configuration
///
/// # Environment Variables
///
/// - `MESSAGE_RELAY_SERVICE_HOST` (optional): bind host (default: "0.0.0.0",
///   fallback: `HOST`)
/// - `MESSAGE_RELAY_SERVICE_PORT` (optional): WebSocket/API port (default:
///   8080, fallback: `PORT`)
/// - `MESSAGE_RELAY_HEALTH_PORT` (optional): health-probe port (default:
///   same as the service port)
/// - `MESSAGE_RELAY_SERVICE_WORKERS` (optional): worker threads (default:
///   CPU count)
/// - `MESSAGE_RELAY_SERVICE_LOG_LEVEL` (optional): log level (default:
///   "info", fallback: `RUST_LOG`)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service bind host
    pub host: String,
    /// WebSocket + API bind port
    pub listen_port: u16,
    /// Health-probe port; when it differs from `listen_port` a dedicated
    /// probe server is bound on it
    pub health_port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            listen_port: 8080,
            health_port: 8080,
            workers: num_cpus::get(),
            log_level: "info".to_string(),
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, RelayError> {
        let host = std::env::var("MESSAGE_RELAY_SERVICE_HOST")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| ServiceConfig::default().host);

        let listen_port = parse_env_var(
            "MESSAGE_RELAY_SERVICE_PORT",
            ServiceConfig::default().listen_port,
        )
        .or_else(|_| parse_env_var("PORT", ServiceConfig::default().listen_port))?;

        let health_port = parse_env_var("MESSAGE_RELAY_HEALTH_PORT", listen_port)?;

        let workers = parse_env_var(
            "MESSAGE_RELAY_SERVICE_WORKERS",
            ServiceConfig::default().workers,
        )?;

        let log_level = std::env::var("MESSAGE_RELAY_SERVICE_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| ServiceConfig::default().log_level);

        Ok(Self {
            host,
            listen_port,
            health_port,
            workers,
            log_level,
        })
    }

    fn validate(&self) -> Result<(), RelayError> {
        if self.listen_port == 0 {
            return Err(RelayError::ConfigurationError {
                message: "listen port must be greater than 0".to_string(),
                key: Some("MESSAGE_RELAY_SERVICE_PORT".to_string()),
            });
        }

        if self.health_port == 0 {
            return Err(RelayError::ConfigurationError {
                message: "health port must be greater than 0".to_string(),
                key: Some("MESSAGE_RELAY_HEALTH_PORT".to_string()),
            });
        }

        if self.workers == 0 {
            return Err(RelayError::ConfigurationError {
                message: "workers must be greater than 0".to_string(),
                key: Some("MESSAGE_RELAY_SERVICE_WORKERS".to_string()),
            });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(RelayError::ConfigurationError {
                message: format!(
                    "Invalid log_level '{}'. Must be one of: {}",
                    self.log_level,
                    valid_log_levels.join(", ")
                ),
                key: Some("MESSAGE_RELAY_SERVICE_LOG_LEVEL".to_string()),
            });
        }

        Ok(())
    }
}

/// Database configuration for the durable-table backend
///
/// # Environment Variables
///
/// - `MESSAGE_RELAY_DATABASE_URL` (required for the postgres backend,
///   fallback: `DATABASE_URL`)
/// - `MESSAGE_RELAY_DATABASE_MAX_CONNECTIONS` (optional, default: 10)
/// - `MESSAGE_RELAY_DATABASE_MIN_CONNECTIONS` (optional, default: 1)
/// - `MESSAGE_RELAY_DATABASE_CONNECT_TIMEOUT` (optional, seconds, default: 10)
/// - `MESSAGE_RELAY_DATABASE_IDLE_TIMEOUT` (optional, seconds, default: 600)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection acquire timeout
    pub connect_timeout: Duration,
    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/message_relay".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl ConfigLoader for DatabaseConfig {
    fn from_env() -> Result<Self, RelayError> {
        let url = std::env::var("MESSAGE_RELAY_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| RelayError::ConfigurationError {
                message: "DATABASE_URL or MESSAGE_RELAY_DATABASE_URL must be set".to_string(),
                key: Some("MESSAGE_RELAY_DATABASE_URL".to_string()),
            })?;

        let max_connections = parse_env_var(
            "MESSAGE_RELAY_DATABASE_MAX_CONNECTIONS",
            DatabaseConfig::default().max_connections,
        )?;

        let min_connections = parse_env_var(
            "MESSAGE_RELAY_DATABASE_MIN_CONNECTIONS",
            DatabaseConfig::default().min_connections,
        )?;

        let connect_timeout_secs = parse_env_var("MESSAGE_RELAY_DATABASE_CONNECT_TIMEOUT", 10u64)?;
        let idle_timeout_secs = parse_env_var("MESSAGE_RELAY_DATABASE_IDLE_TIMEOUT", 600u64)?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), RelayError> {
        Url::parse(&self.url).map_err(|e| RelayError::ConfigurationError {
            message: format!("Invalid DATABASE_URL: {}", e),
            key: Some("MESSAGE_RELAY_DATABASE_URL".to_string()),
        })?;

        if self.max_connections == 0 {
            return Err(RelayError::ConfigurationError {
                message: "max_connections must be greater than 0".to_string(),
                key: Some("MESSAGE_RELAY_DATABASE_MAX_CONNECTIONS".to_string()),
            });
        }

        if self.min_connections > self.max_connections {
            return Err(RelayError::ConfigurationError {
                message: format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    self.min_connections, self.max_connections
                ),
                key: Some("MESSAGE_RELAY_DATABASE_MIN_CONNECTIONS".to_string()),
            });
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(RelayError::ConfigurationError {
                message: "connect_timeout must be greater than 0 seconds".to_string(),
                key: Some("MESSAGE_RELAY_DATABASE_CONNECT_TIMEOUT".to_string()),
            });
        }

        Ok(())
    }
}

/// Redis configuration for the distributed-cache backend
///
/// # Environment Variables
///
/// - `MESSAGE_RELAY_REDIS_URL` (required for the redis backend, fallback:
///   `REDIS_URL`)
/// - `MESSAGE_RELAY_REDIS_CONNECTION_TIMEOUT` (optional, seconds, default: 10)
/// - `MESSAGE_RELAY_REDIS_RESPONSE_TIMEOUT` (optional, seconds, default: 5)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout duration
    pub connection_timeout: Duration,
    /// Response timeout duration
    pub response_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            connection_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl ConfigLoader for RedisConfig {
    fn from_env() -> Result<Self, RelayError> {
        let url = std::env::var("MESSAGE_RELAY_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .map_err(|_| RelayError::ConfigurationError {
                message: "REDIS_URL or MESSAGE_RELAY_REDIS_URL must be set".to_string(),
                key: Some("MESSAGE_RELAY_REDIS_URL".to_string()),
            })?;

        let connection_timeout_secs =
            parse_env_var("MESSAGE_RELAY_REDIS_CONNECTION_TIMEOUT", 10u64)?;
        let response_timeout_secs = parse_env_var("MESSAGE_RELAY_REDIS_RESPONSE_TIMEOUT", 5u64)?;

        Ok(Self {
            url,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
            response_timeout: Duration::from_secs(response_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), RelayError> {
        Url::parse(&self.url).map_err(|e| RelayError::ConfigurationError {
            message: format!("Invalid REDIS_URL: {}", e),
            key: Some("MESSAGE_RELAY_REDIS_URL".to_string()),
        })?;

        if self.connection_timeout.as_secs() == 0 {
            return Err(RelayError::ConfigurationError {
                message: "connection_timeout must be greater than 0 seconds".to_string(),
                key: Some("MESSAGE_RELAY_REDIS_CONNECTION_TIMEOUT".to_string()),
            });
        }

        Ok(())
    }
}

/// Top-level relay configuration
///
/// Aggregates the backend selection signal, the service settings, and the
/// storage configuration for whichever backend was selected. Only the
/// configuration for the selected backend is loaded; running against Redis
/// does not require `DATABASE_URL` and vice versa.
///
/// # Environment Variables
///
/// - `MESSAGE_RELAY_BACKEND` (optional): `postgres` | `redis` | `memory`.
///   When unset, the backend is auto-detected: `REDIS_URL` present → redis,
///   otherwise `DATABASE_URL` present → postgres, otherwise memory.
/// - `MESSAGE_RELAY_CONNECTION_TTL` (optional): connection record expiry in
///   seconds (default: 300)
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Selected registry backend
    pub backend: BackendKind,
    /// HTTP/WebSocket service settings
    pub service: ServiceConfig,
    /// Database settings, present when the postgres backend is selected
    pub database: Option<DatabaseConfig>,
    /// Redis settings, present when the redis backend is selected
    pub redis: Option<RedisConfig>,
    /// Expiry applied to connection records, refreshed on every write
    pub record_ttl: Duration,
}

impl RelayConfig {
    fn detect_backend() -> Result<BackendKind, RelayError> {
        if let Ok(value) = std::env::var("MESSAGE_RELAY_BACKEND") {
            return value.parse();
        }

        if std::env::var("MESSAGE_RELAY_REDIS_URL").is_ok() || std::env::var("REDIS_URL").is_ok() {
            Ok(BackendKind::Redis)
        } else if std::env::var("MESSAGE_RELAY_DATABASE_URL").is_ok()
            || std::env::var("DATABASE_URL").is_ok()
        {
            Ok(BackendKind::Postgres)
        } else {
            tracing::warn!(
                "No backend configured, falling back to the in-memory registry; \
                 set MESSAGE_RELAY_BACKEND for production deployments"
            );
            Ok(BackendKind::Memory)
        }
    }
}

impl ConfigLoader for RelayConfig {
    fn from_env() -> Result<Self, RelayError> {
        let backend = Self::detect_backend()?;
        let service = ServiceConfig::from_env()?;

        let database = match backend {
            BackendKind::Postgres => Some(DatabaseConfig::from_env()?),
            _ => None,
        };
        let redis = match backend {
            BackendKind::Redis => Some(RedisConfig::from_env()?),
            _ => None,
        };

        let record_ttl_secs = parse_env_var("MESSAGE_RELAY_CONNECTION_TTL", 300u64)?;

        Ok(Self {
            backend,
            service,
            database,
            redis,
            record_ttl: Duration::from_secs(record_ttl_secs),
        })
    }

    fn validate(&self) -> Result<(), RelayError> {
        self.service.validate()?;

        if let Some(database) = &self.database {
            database.validate()?;
        }
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }

        if self.record_ttl.as_secs() == 0 {
            return Err(RelayError::ConfigurationError {
                message: "connection TTL must be greater than 0 seconds".to_string(),
                key: Some("MESSAGE_RELAY_CONNECTION_TTL".to_string()),
            });
        }

        Ok(())
    }
}

/// Helper function to parse an environment variable with a default value.
fn parse_env_var<T>(key: &str, default: T) -> Result<T, RelayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>().map_err(|e| RelayError::ConfigurationError {
                message: format!("Failed to parse {}: {}", key, e),
                key: Some(key.to_string()),
            })
        })
        .unwrap_or(Ok(default))
}

/// Load a .env file if present.
///
/// Does not fail when the file is missing.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}
