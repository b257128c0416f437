//! Backend selection
//!
//! A pure function of one configuration signal, evaluated once at process
//! start. There is no runtime switching; changing the backend requires a
//! restart. Tests bypass detection with [`select_backend_with`].

use message_relay_core::config::{BackendKind, RelayConfig};
use message_relay_core::error::RelayError;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ConnectionRegistry, InMemoryRegistry, PostgresRegistry, RedisRegistry};

/// Resolve the registry backend named by the configuration.
pub async fn select_backend(
    config: &RelayConfig,
) -> Result<Arc<dyn ConnectionRegistry>, RelayError> {
    select_backend_with(config.backend, config).await
}

/// Resolve a specific backend, bypassing the configured kind. Used by tests
/// that need a deterministic registry regardless of the environment.
pub async fn select_backend_with(
    kind: BackendKind,
    config: &RelayConfig,
) -> Result<Arc<dyn ConnectionRegistry>, RelayError> {
    info!(backend = %kind, "selecting connection registry backend");

    match kind {
        BackendKind::Postgres => {
            let database = config.database.as_ref().ok_or_else(|| {
                RelayError::ConfigurationError {
                    message: "postgres backend selected but no database configured".to_string(),
                    key: Some("MESSAGE_RELAY_DATABASE_URL".to_string()),
                }
            })?;

            let registry = PostgresRegistry::connect(database, config.record_ttl)?;
            // Reachability failures must not be fatal at startup; the
            // readiness probe stays false until the schema call succeeds
            // on a later operation.
            if let Err(e) = registry.ensure_schema().await {
                warn!(error = %e, "could not prepare registry schema, continuing");
            }
            Ok(Arc::new(registry))
        }
        BackendKind::Redis => {
            let redis = config
                .redis
                .as_ref()
                .ok_or_else(|| RelayError::ConfigurationError {
                    message: "redis backend selected but no redis configured".to_string(),
                    key: Some("MESSAGE_RELAY_REDIS_URL".to_string()),
                })?;

            Ok(Arc::new(RedisRegistry::connect(redis, config.record_ttl)?))
        }
        BackendKind::Memory => Ok(Arc::new(InMemoryRegistry::new(config.record_ttl))),
    }
}
