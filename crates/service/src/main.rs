//! Message relay entry point
//!
//! Loads configuration from the environment, resolves the registry backend
//! once, wires the explicit instances together, and runs the server under
//! the shutdown coordinator.

use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

use message_relay_core::config::{load_dotenv, ConfigLoader, RelayConfig};
use message_relay_core::shutdown::{ShutdownConfig, ShutdownCoordinator};

use message_relay_service::{
    init_tracing, select_backend, start_server, AppState, BackendMonitor, BroadcastRouter,
    DeliveryPolicy, SessionTable,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = RelayConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config.service.log_level);

    tracing::info!(
        backend = %config.backend,
        host = %config.service.host,
        port = config.service.listen_port,
        "starting message relay"
    );

    let registry = select_backend(&config)
        .await
        .context("failed to initialize connection registry backend")?;

    let sessions = Arc::new(SessionTable::new());
    let router = Arc::new(BroadcastRouter::new(
        registry.clone(),
        sessions.clone(),
        DeliveryPolicy::FirstSuccess,
    ));
    let monitor = Arc::new(BackendMonitor::new());

    let coordinator = Arc::new(ShutdownCoordinator::new(ShutdownConfig::default()));

    tokio::spawn(
        monitor
            .clone()
            .run(registry.clone(), coordinator.create_shutdown_signal()),
    );

    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.wait_for_signal().await });
    }

    let state = AppState {
        registry,
        sessions,
        router,
        monitor,
        started_at: Instant::now(),
    };

    start_server(config.service.clone(), state, &coordinator)
        .await
        .context("server error")?;

    tracing::info!("message relay stopped");
    Ok(())
}
