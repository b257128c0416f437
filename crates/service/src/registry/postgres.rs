//! PostgreSQL durable-table backend
//!
//! Point reads and writes keyed by connection id, with a role-filtered scan
//! for `list_by_role`. Connection counts are small (hundreds), so the scan
//! stays cheap and consistency wins over scan cost. Expiry is an
//! `expires_at` column enforced on every read; `cleanup_expired` reclaims
//! lapsed rows early for callers that want it.

use async_trait::async_trait;
use chrono::Utc;
use message_relay_core::config::DatabaseConfig;
use message_relay_core::error::RelayError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, warn};

use super::{validate_id, ConnectionRecord, ConnectionRegistry, Metadata};
use crate::protocol::Role;

pub struct PostgresRegistry {
    pool: PgPool,
    ttl: Duration,
}

impl PostgresRegistry {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Build a registry over a lazy pool. No connection is attempted here,
    /// so an unreachable database at startup leaves readiness false instead
    /// of failing the process.
    pub fn connect(config: &DatabaseConfig, ttl: Duration) -> Result<Self, RelayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_lazy(&config.url)?;

        Ok(Self::new(pool, ttl))
    }

    /// Create the connections table and role index when absent. A failure
    /// here is logged by the caller and the process keeps running; every
    /// operation keeps surfacing `BackendUnavailable` until the table
    /// exists.
    pub async fn ensure_schema(&self) -> Result<(), RelayError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relay_connections (
                connection_id TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_relay_connections_role ON relay_connections (role)",
        )
        .execute(&self.pool)
        .await?;

        debug!("relay_connections schema ready");
        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<ConnectionRecord, RelayError> {
        let id: String = row.try_get("connection_id")?;
        let role: String = row.try_get("role")?;
        let metadata: serde_json::Value = row.try_get("metadata")?;
        let created_at = row.try_get("created_at")?;
        let expires_at = row.try_get("expires_at")?;

        let role = Role::parse(&role)
            .ok_or_else(|| RelayError::Internal(format!("unknown role '{}' in registry", role)))?;
        let metadata: Metadata = serde_json::from_value(metadata).unwrap_or_default();

        Ok(ConnectionRecord {
            id,
            role,
            created_at,
            expires_at,
            metadata,
        })
    }
}

#[async_trait]
impl ConnectionRegistry for PostgresRegistry {
    async fn register(
        &self,
        id: &str,
        role: Role,
        metadata: Option<Metadata>,
    ) -> Result<(), RelayError> {
        validate_id(id)?;

        let record = ConnectionRecord::new(id, role, self.ttl, metadata);
        let metadata = serde_json::to_value(&record.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO relay_connections (connection_id, role, metadata, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (connection_id) DO UPDATE SET
                role = EXCLUDED.role,
                metadata = EXCLUDED.metadata,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(id)
        .bind(record.role.as_str())
        .bind(metadata)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unregister(&self, id: &str) -> Result<(), RelayError> {
        sqlx::query("DELETE FROM relay_connections WHERE connection_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<(), RelayError> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));

        let result = sqlx::query(
            r#"
            UPDATE relay_connections
            SET role = $2, expires_at = $3
            WHERE connection_id = $1 AND expires_at > now()
            "#,
        )
        .bind(id)
        .bind(role.as_str())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RelayError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<String>, RelayError> {
        let rows = sqlx::query(
            r#"
            SELECT connection_id
            FROM relay_connections
            WHERE role = $1 AND expires_at > now()
            ORDER BY created_at
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("connection_id").map_err(Into::into))
            .collect()
    }

    async fn get(&self, id: &str) -> Result<Option<ConnectionRecord>, RelayError> {
        let row = sqlx::query(
            r#"
            SELECT connection_id, role, metadata, created_at, expires_at
            FROM relay_connections
            WHERE connection_id = $1 AND expires_at > now()
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn exists(&self, id: &str) -> Result<bool, RelayError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM relay_connections
                WHERE connection_id = $1 AND expires_at > now()
            ) AS present
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("present")?)
    }

    async fn cleanup_expired(&self) -> Result<u64, RelayError> {
        let result = sqlx::query("DELETE FROM relay_connections WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            warn!(removed, "reclaimed expired connection records");
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), RelayError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
