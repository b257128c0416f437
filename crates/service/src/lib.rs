//! Message Relay Service
//!
//! Real-time message relay: clients connect over a WebSocket, declare a
//! role (`user` producer / `admin` consumer), and producer messages are
//! delivered to a consumer connection. The connection registry behind the
//! relay is swappable between a PostgreSQL durable table and a Redis
//! distributed cache without touching the relay logic.

pub mod monitor;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod sessions;
pub mod websocket;

pub use monitor::BackendMonitor;
pub use protocol::{ClientCommand, DeliveredMessage, ErrorFrame, Role, ServerEvent};
pub use registry::{
    select_backend, select_backend_with, ConnectionRecord, ConnectionRegistry, InMemoryRegistry,
    PostgresRegistry, RedisRegistry,
};
pub use router::{BroadcastRouter, DeliveryPolicy, DeliveryReport};
pub use server::{start_server, AppState};
pub use sessions::{Outbound, SessionHandle, SessionTable, ShutdownNotice};
pub use websocket::RelaySession;

/// Initialize tracing for the relay service.
///
/// `RUST_LOG` wins when set; otherwise the configured default level is
/// applied to this crate and its core.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default_filter = format!(
        "message_relay_service={level},message_relay_core={level}",
        level = default_level
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
