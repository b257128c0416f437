//! In-memory connection registry
//!
//! The third registry variant: no I/O, deterministic, used by tests and as
//! the fallback when no backend is configured. Expiry is enforced on every
//! read, matching the contract of the production backends.

use async_trait::async_trait;
use dashmap::DashMap;
use message_relay_core::error::RelayError;
use std::time::Duration;

use super::{validate_id, ConnectionRecord, ConnectionRegistry, Metadata};
use crate::protocol::Role;

pub struct InMemoryRegistry {
    records: DashMap<String, ConnectionRecord>,
    ttl: Duration,
}

impl InMemoryRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    /// Number of live records, expired ones excluded.
    pub fn len(&self) -> usize {
        self.records.iter().filter(|r| !r.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryRegistry {
    async fn register(
        &self,
        id: &str,
        role: Role,
        metadata: Option<Metadata>,
    ) -> Result<(), RelayError> {
        validate_id(id)?;
        self.records.insert(
            id.to_string(),
            ConnectionRecord::new(id, role, self.ttl, metadata),
        );
        Ok(())
    }

    async fn unregister(&self, id: &str) -> Result<(), RelayError> {
        self.records.remove(id);
        Ok(())
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<(), RelayError> {
        let lapsed = match self.records.get_mut(id) {
            Some(mut record) => {
                if record.is_expired() {
                    true
                } else {
                    record.role = role;
                    let ttl = self.ttl;
                    record.refresh_expiry(ttl);
                    return Ok(());
                }
            }
            None => false,
        };
        if lapsed {
            self.records.remove(id);
        }
        Err(RelayError::NotFound(id.to_string()))
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<String>, RelayError> {
        let mut ids: Vec<(chrono::DateTime<chrono::Utc>, String)> = self
            .records
            .iter()
            .filter(|r| r.role == role && !r.is_expired())
            .map(|r| (r.created_at, r.id.clone()))
            .collect();
        // Registry order: oldest registration first.
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<ConnectionRecord>, RelayError> {
        Ok(self
            .records
            .get(id)
            .filter(|r| !r.is_expired())
            .map(|r| r.value().clone()))
    }

    async fn exists(&self, id: &str) -> Result<bool, RelayError> {
        Ok(self
            .records
            .get(id)
            .map(|r| !r.is_expired())
            .unwrap_or(false))
    }

    async fn cleanup_expired(&self) -> Result<u64, RelayError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired());
        Ok((before - self.records.len()) as u64)
    }

    async fn ping(&self) -> Result<(), RelayError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
