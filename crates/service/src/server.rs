//! HTTP server for the relay
//!
//! One actix-web server carries the WebSocket endpoint and the probe
//! routes; when the configured health port differs from the listen port, a
//! second probe-only server is bound so orchestration can reach the checks
//! without touching the main surface. Shutdown: notify every open session,
//! give notices a moment to flush, then stop the servers, all bounded by
//! the coordinator deadline.

use actix_web::{get, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use message_relay_core::config::ServiceConfig;
use message_relay_core::health::{AggregatedHealth, ComponentHealth};
use message_relay_core::shutdown::ShutdownCoordinator;

use crate::monitor::BackendMonitor;
use crate::protocol::Role;
use crate::registry::ConnectionRegistry;
use crate::router::BroadcastRouter;
use crate::sessions::{SessionTable, ShutdownNotice};
use crate::websocket::RelaySession;

/// Shared state, constructed once in `main` and injected into handlers.
pub struct AppState {
    pub registry: Arc<dyn ConnectionRegistry>,
    pub sessions: Arc<SessionTable>,
    pub router: Arc<BroadcastRouter>,
    pub monitor: Arc<BackendMonitor>,
    pub started_at: Instant,
}

/// WebSocket connection endpoint
#[get("/ws")]
pub async fn websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let session = RelaySession::new(
        state.registry.clone(),
        state.sessions.clone(),
        state.router.clone(),
    );
    ws::start(session, &req, stream)
}

/// Liveness: healthy once the process is serving.
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "connectionCount": state.sessions.count(),
        "backendConnected": state.monitor.is_ready(),
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

/// Readiness: ready only while the backend reachability probe is fresh.
#[get("/ready")]
pub async fn ready(state: web::Data<AppState>) -> impl Responder {
    let backend = state.monitor.component_health();
    let server = ComponentHealth::healthy("server", true);

    let checks = serde_json::json!({
        "backend": backend.is_ready(),
        "server": server.is_ready(),
    });
    let aggregated = AggregatedHealth::from_components(vec![backend, server]);
    let body = serde_json::json!({
        "ready": aggregated.is_ready(),
        "checks": checks,
    });

    if aggregated.is_ready() {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Local connection counts, per-role counts, and cumulative message counter.
#[get("/metrics")]
pub async fn metrics(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "connections": {
            "total": state.sessions.count(),
            "user": state.sessions.count_by_role(Role::Producer),
            "admin": state.sessions.count_by_role(Role::Consumer),
        },
        "messagesRelayed": state.sessions.messages_relayed(),
        "backend": state.registry.backend_name(),
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

/// Basic service info
#[get("/")]
pub async fn info_endpoint() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "message-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/ws", "/health", "/ready", "/metrics"],
    }))
}

/// Run the relay until a shutdown signal arrives or a server fails.
pub async fn start_server(
    config: ServiceConfig,
    state: AppState,
    coordinator: &ShutdownCoordinator,
) -> std::io::Result<()> {
    let data = web::Data::new(state);

    info!(
        host = %config.host,
        port = config.listen_port,
        "starting relay server"
    );

    let main_server = {
        let data = data.clone();
        HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .service(websocket)
                .service(health)
                .service(ready)
                .service(metrics)
                .service(info_endpoint)
        })
        .workers(config.workers)
        .bind((config.host.as_str(), config.listen_port))?
        .run()
    };

    let probe_server = if config.health_port != config.listen_port {
        info!(port = config.health_port, "starting probe server");
        let data = data.clone();
        Some(
            HttpServer::new(move || {
                App::new()
                    .app_data(data.clone())
                    .service(health)
                    .service(ready)
                    .service(metrics)
            })
            .workers(1)
            .bind((config.host.as_str(), config.health_port))?
            .run(),
        )
    } else {
        None
    };

    // Every open session is notified before any socket is closed; the
    // notice handler sends the shutdown frame and closes its own socket.
    let sessions = data.sessions.clone();
    coordinator.on_shutdown(move || {
        let controls = sessions.controls();
        info!(sessions = controls.len(), "notifying open sessions of shutdown");
        for control in controls {
            control.do_send(ShutdownNotice);
        }
    });

    let main_handle = main_server.handle();
    let probe_handle = probe_server.as_ref().map(|s| s.handle());

    let mut main_task = tokio::spawn(main_server);
    let probe_task = probe_server.map(tokio::spawn);

    let deadline = coordinator.config().deadline;
    let shutdown_signal = coordinator.create_shutdown_signal();

    tokio::select! {
        result = &mut main_task => {
            // Server ended on its own (bind torn down or fatal error).
            result.unwrap_or_else(|e| {
                Err(std::io::Error::new(std::io::ErrorKind::Other, e))
            })
        }
        _ = shutdown_signal => {
            info!("stopping servers");
            let stop = async {
                main_handle.stop(true).await;
                if let Some(handle) = probe_handle {
                    handle.stop(true).await;
                }
            };

            if tokio::time::timeout(deadline, stop).await.is_err() {
                warn!(
                    deadline_secs = deadline.as_secs(),
                    "shutdown deadline exceeded, forcing exit"
                );
            }

            main_task.abort();
            if let Some(task) = probe_task {
                task.abort();
            }
            Ok(())
        }
    }
}
