//! Redis distributed-cache backend
//!
//! Two structures per connection: an individual key `conn:{id}` holding the
//! JSON record with a backend-native TTL, and a per-role membership set
//! `role:{user|admin}` whose own TTL is refreshed on every write but is
//! independent of the member keys. The set can therefore name ids whose
//! individual key has already lapsed, so `list_by_role` verifies every
//! candidate against its key and removes verified-stale members from the
//! set as it goes. Skipping that check produces phantom recipients.

use async_trait::async_trait;
use message_relay_core::config::RedisConfig;
use message_relay_core::error::RelayError;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::time::Duration;
use tracing::debug;

use super::{validate_id, ConnectionRecord, ConnectionRegistry, Metadata};
use crate::protocol::Role;

const CONN_KEY_PREFIX: &str = "conn:";
const ROLE_KEY_PREFIX: &str = "role:";

pub struct RedisRegistry {
    client: Client,
    ttl: Duration,
}

impl RedisRegistry {
    /// Build a registry over a lazy client. Opening only parses the URL;
    /// an unreachable server surfaces as `BackendUnavailable` per
    /// operation, never as a startup failure.
    pub fn connect(config: &RedisConfig, ttl: Duration) -> Result<Self, RelayError> {
        let client = Client::open(config.url.as_str())?;
        Ok(Self { client, ttl })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, RelayError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn conn_key(id: &str) -> String {
        format!("{}{}", CONN_KEY_PREFIX, id)
    }

    fn role_key(role: Role) -> String {
        format!("{}{}", ROLE_KEY_PREFIX, role.as_str())
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    async fn write_record(
        &self,
        conn: &mut MultiplexedConnection,
        record: &ConnectionRecord,
    ) -> Result<(), RelayError> {
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(Self::conn_key(&record.id), payload, self.ttl_secs())
            .await?;

        // Membership set refresh; its TTL is independent of conn:{id}.
        let role_key = Self::role_key(record.role);
        conn.sadd::<_, _, ()>(&role_key, &record.id).await?;
        conn.expire::<_, ()>(&role_key, self.ttl_secs() as i64)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionRegistry for RedisRegistry {
    async fn register(
        &self,
        id: &str,
        role: Role,
        metadata: Option<Metadata>,
    ) -> Result<(), RelayError> {
        validate_id(id)?;

        let mut conn = self.conn().await?;
        let record = ConnectionRecord::new(id, role, self.ttl, metadata);
        self.write_record(&mut conn, &record).await?;

        // An upsert may change the role; drop the id from the other set so
        // it never appears under both.
        conn.srem::<_, _, ()>(Self::role_key(role.opposite()), id)
            .await?;
        Ok(())
    }

    async fn unregister(&self, id: &str) -> Result<(), RelayError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(Self::conn_key(id)).await?;
        conn.srem::<_, _, ()>(Self::role_key(Role::Producer), id)
            .await?;
        conn.srem::<_, _, ()>(Self::role_key(Role::Consumer), id)
            .await?;
        Ok(())
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<(), RelayError> {
        let mut conn = self.conn().await?;

        let payload: Option<String> = conn.get(Self::conn_key(id)).await?;
        let mut record: ConnectionRecord = match payload {
            Some(p) => serde_json::from_str(&p)?,
            None => return Err(RelayError::NotFound(id.to_string())),
        };

        if record.role != role {
            conn.srem::<_, _, ()>(Self::role_key(record.role), id)
                .await?;
        }
        record.role = role;
        record.refresh_expiry(self.ttl);
        self.write_record(&mut conn, &record).await?;
        Ok(())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<String>, RelayError> {
        let mut conn = self.conn().await?;
        let role_key = Self::role_key(role);
        let members: Vec<String> = conn.smembers(&role_key).await?;

        // Self-healing read: the set outlives individual keys, so every
        // candidate is verified against its key and stale members are
        // removed on the way through.
        let mut live = Vec::with_capacity(members.len());
        for id in members {
            if conn.exists::<_, bool>(Self::conn_key(&id)).await? {
                live.push(id);
            } else {
                conn.srem::<_, _, ()>(&role_key, &id).await?;
                debug!(id = %id, role = %role, "pruned stale id from role set");
            }
        }
        Ok(live)
    }

    async fn get(&self, id: &str) -> Result<Option<ConnectionRecord>, RelayError> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(Self::conn_key(id)).await?;

        match payload {
            Some(p) => {
                let record: ConnectionRecord = serde_json::from_str(&p)?;
                // The key TTL enforces expiry; the record timestamp is a
                // second line of defense against clock drift on writers.
                Ok((!record.is_expired()).then_some(record))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, RelayError> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(Self::conn_key(id)).await?)
    }

    async fn cleanup_expired(&self) -> Result<u64, RelayError> {
        // Individual keys lapse on their own; reclamation here means
        // pruning role-set members whose key is gone.
        let mut conn = self.conn().await?;
        let mut removed = 0u64;

        for role in [Role::Producer, Role::Consumer] {
            let role_key = Self::role_key(role);
            let members: Vec<String> = conn.smembers(&role_key).await?;
            for id in members {
                if !conn.exists::<_, bool>(Self::conn_key(&id)).await? {
                    conn.srem::<_, _, ()>(&role_key, &id).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), RelayError> {
        let mut conn = self.conn().await?;
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        if response != "PONG" {
            return Err(RelayError::BackendUnavailable(format!(
                "unexpected PING response: {}",
                response
            )));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(RedisRegistry::conn_key("abc"), "conn:abc");
        assert_eq!(RedisRegistry::role_key(Role::Producer), "role:user");
        assert_eq!(RedisRegistry::role_key(Role::Consumer), "role:admin");
    }

    #[test]
    fn test_ttl_floor_is_one_second() {
        let registry = RedisRegistry {
            client: Client::open("redis://localhost:6379").unwrap(),
            ttl: Duration::ZERO,
        };
        assert_eq!(registry.ttl_secs(), 1);
    }
}
