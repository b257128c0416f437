//! Connection registry abstraction
//!
//! The registry owns the persisted/shared view of connections; the local
//! socket table owns the live sockets. The two are kept consistent but
//! never merged, because the registry may be shared by several relay
//! processes while sockets are strictly local.
//!
//! Three implementations sit behind one trait: a PostgreSQL durable table,
//! a Redis distributed cache, and an in-memory fake for tests. Which one a
//! process runs against is decided exactly once at startup by the selector.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use message_relay_core::error::RelayError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::protocol::Role;

pub mod memory;
pub mod postgres;
pub mod redis;
pub mod selector;

pub use memory::InMemoryRegistry;
pub use postgres::PostgresRegistry;
pub use redis::RedisRegistry;
pub use selector::{select_backend, select_backend_with};

/// Open key-value metadata attached to a connection record.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A persisted connection record.
///
/// A record whose `expires_at` has lapsed must never be returned by a read,
/// regardless of backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
}

impl ConnectionRecord {
    pub fn new(id: impl Into<String>, role: Role, ttl: Duration, metadata: Option<Metadata>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            role,
            created_at: now,
            expires_at: now + ttl_to_chrono(ttl),
            metadata: metadata.unwrap_or_default(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Push the expiry forward by `ttl` from now.
    pub fn refresh_expiry(&mut self, ttl: Duration) {
        self.expires_at = Utc::now() + ttl_to_chrono(ttl);
    }
}

fn ttl_to_chrono(ttl: Duration) -> ChronoDuration {
    ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(300))
}

/// Reject empty connection ids before they reach a backend.
pub(crate) fn validate_id(id: &str) -> Result<(), RelayError> {
    if id.is_empty() {
        return Err(RelayError::InvalidMessage(
            "connection id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// CRUD over connection records, backend-agnostic.
///
/// All operations may perform network I/O. Reachability failures surface as
/// [`RelayError::BackendUnavailable`]; callers on the hot path (register /
/// unregister) log and continue, while `list_by_role` failures are treated
/// by the router as "no recipients found".
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Idempotent upsert. Overwriting an existing id is not an error; the
    /// record expiry is refreshed.
    async fn register(
        &self,
        id: &str,
        role: Role,
        metadata: Option<Metadata>,
    ) -> Result<(), RelayError>;

    /// Idempotent delete. Removing a non-existent id is not an error.
    async fn unregister(&self, id: &str) -> Result<(), RelayError>;

    /// Change the role of an existing record, refreshing its expiry.
    /// Fails with [`RelayError::NotFound`] when no live record exists.
    async fn update_role(&self, id: &str, role: Role) -> Result<(), RelayError>;

    /// Ids of live records with the given role, in registry order.
    /// Never contains expired records or duplicates.
    async fn list_by_role(&self, role: Role) -> Result<Vec<String>, RelayError>;

    /// The live record for `id`, if any.
    async fn get(&self, id: &str) -> Result<Option<ConnectionRecord>, RelayError>;

    /// Whether a live record exists for `id`.
    async fn exists(&self, id: &str) -> Result<bool, RelayError>;

    /// Optional maintenance: reclaim expired records early. Returns the
    /// number of records removed.
    async fn cleanup_expired(&self) -> Result<u64, RelayError> {
        Ok(0)
    }

    /// Cheap reachability probe used by the readiness monitor.
    async fn ping(&self) -> Result<(), RelayError>;

    /// Backend label for logs and metrics.
    fn backend_name(&self) -> &'static str;
}
