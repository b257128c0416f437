//! Registry contract tests against the in-memory backend
//!
//! The in-memory registry implements the same contract as the production
//! backends, so the lifecycle properties are exercised here without
//! external services.

use std::time::Duration;

use message_relay_core::config::{BackendKind, RelayConfig, ServiceConfig};
use message_relay_core::error::RelayError;
use message_relay_service::protocol::Role;
use message_relay_service::registry::{select_backend_with, ConnectionRegistry, InMemoryRegistry};

fn memory_config() -> RelayConfig {
    RelayConfig {
        backend: BackendKind::Memory,
        service: ServiceConfig::default(),
        database: None,
        redis: None,
        record_ttl: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn registered_id_exists_until_unregistered() {
    let registry = InMemoryRegistry::new(Duration::from_secs(60));

    registry
        .register("conn-a", Role::Producer, None)
        .await
        .unwrap();
    assert!(registry.exists("conn-a").await.unwrap());

    registry.unregister("conn-a").await.unwrap();
    assert!(!registry.exists("conn-a").await.unwrap());

    // Idempotent delete
    registry.unregister("conn-a").await.unwrap();
}

#[tokio::test]
async fn role_update_moves_id_between_role_lists() {
    let registry = InMemoryRegistry::new(Duration::from_secs(60));

    registry
        .register("conn-a", Role::Producer, None)
        .await
        .unwrap();
    let record = registry.get("conn-a").await.unwrap().unwrap();
    assert_eq!(record.role, Role::Producer);

    registry
        .update_role("conn-a", Role::Consumer)
        .await
        .unwrap();

    let admins = registry.list_by_role(Role::Consumer).await.unwrap();
    let users = registry.list_by_role(Role::Producer).await.unwrap();
    assert!(admins.contains(&"conn-a".to_string()));
    assert!(!users.contains(&"conn-a".to_string()));
}

#[tokio::test]
async fn expired_records_are_invisible_to_every_read() {
    let registry = InMemoryRegistry::new(Duration::ZERO);

    registry
        .register("conn-a", Role::Consumer, None)
        .await
        .unwrap();

    assert!(!registry.exists("conn-a").await.unwrap());
    assert!(registry.get("conn-a").await.unwrap().is_none());
    assert!(registry
        .list_by_role(Role::Consumer)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn update_role_on_unknown_id_is_not_found() {
    let registry = InMemoryRegistry::new(Duration::from_secs(60));
    let result = registry.update_role("unknown", Role::Consumer).await;
    assert!(matches!(result, Err(RelayError::NotFound(_))));
}

#[tokio::test]
async fn list_by_role_keeps_registration_order() {
    let registry = InMemoryRegistry::new(Duration::from_secs(60));

    registry
        .register("first", Role::Consumer, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    registry
        .register("second", Role::Consumer, None)
        .await
        .unwrap();

    let ids = registry.list_by_role(Role::Consumer).await.unwrap();
    assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn selector_override_returns_memory_backend() {
    let config = memory_config();
    let registry = select_backend_with(BackendKind::Memory, &config)
        .await
        .unwrap();
    assert_eq!(registry.backend_name(), "memory");

    registry.register("a", Role::Producer, None).await.unwrap();
    assert!(registry.exists("a").await.unwrap());
}
