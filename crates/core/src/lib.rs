//! # Message Relay Core
//!
//! Shared building blocks for the message relay service:
//!
//! - `error`: Error taxonomy and HTTP response mapping
//! - `config`: Environment-driven configuration loading and validation
//! - `health`: Health status types and component checks
//! - `shutdown`: Graceful shutdown coordinator

pub mod config;
pub mod error;
pub mod health;
pub mod shutdown;

pub use config::{
    load_dotenv, BackendKind, ConfigLoader, DatabaseConfig, RedisConfig, RelayConfig,
    ServiceConfig,
};
pub use error::RelayError;
pub use health::{AggregatedHealth, ComponentHealth, HealthStatus};
pub use shutdown::{ShutdownConfig, ShutdownCoordinator};

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
