//! WebSocket session actor
//!
//! One actor per connection. The actor owns the connection state machine:
//! accept registers the connection (default role: producer) and sends the
//! connection acknowledgement; inbound frames dispatch on their `action`;
//! close and heartbeat timeout tear the connection down and unregister it.
//! Registry calls run as actor futures via `ctx.wait`, so frames from one
//! connection are processed strictly in arrival order while other
//! connections keep going.

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, Handler, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use message_relay_core::error::RelayError;

use crate::protocol::{ClientCommand, ControlReply, ErrorFrame, Role, ServerEvent};
use crate::registry::ConnectionRegistry;
use crate::router::BroadcastRouter;
use crate::sessions::{Outbound, SessionTable, ShutdownNotice};

/// Interval between server pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A client silent for longer than this is considered half-open and is
/// force-closed: one full unanswered ping cycle.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct RelaySession {
    /// Server-assigned connection id.
    id: String,

    /// Last-known role; every connection starts as a producer.
    role: Role,

    /// Last time the client showed a sign of life.
    alive_at: Instant,

    registry: Arc<dyn ConnectionRegistry>,
    sessions: Arc<SessionTable>,
    router: Arc<BroadcastRouter>,
}

impl RelaySession {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        sessions: Arc<SessionTable>,
        router: Arc<BroadcastRouter>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Producer,
            alive_at: Instant::now(),
            registry,
            sessions,
            router,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.alive_at) > CLIENT_TIMEOUT {
                warn!(id = %act.id, "heartbeat timeout, closing half-open connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_frame<T: serde::Serialize>(&self, ctx: &mut ws::WebsocketContext<Self>, frame: &T) {
        match serde_json::to_string(frame) {
            Ok(json) => ctx.text(json),
            Err(e) => error!(id = %self.id, error = %e, "failed to serialize outbound frame"),
        }
    }

    fn dispatch_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                self.send_frame(ctx, &ErrorFrame::new(format!("malformed message: {}", e)));
                return;
            }
        };

        let action = match value.get("action").and_then(|a| a.as_str()) {
            Some(action) => action.to_string(),
            None => {
                self.send_frame(ctx, &ErrorFrame::new("missing action field"));
                return;
            }
        };

        if !ClientCommand::KNOWN_ACTIONS.contains(&action.as_str()) {
            debug!(id = %self.id, action = %action, "ignoring unrecognized action");
            return;
        }

        match serde_json::from_value::<ClientCommand>(value) {
            Ok(command) => self.handle_command(command, ctx),
            Err(e) => {
                self.send_frame(
                    ctx,
                    &ErrorFrame::new(format!("invalid {} message: {}", action, e)),
                );
            }
        }
    }

    fn handle_command(&mut self, command: ClientCommand, ctx: &mut ws::WebsocketContext<Self>) {
        match command {
            ClientCommand::Identify { connection_type } => {
                self.handle_identify(&connection_type, false, ctx);
            }
            ClientCommand::SetConnectionType { connection_type } => {
                self.handle_identify(&connection_type, true, ctx);
            }
            ClientCommand::SendMessage { data } => {
                let router = self.router.clone();
                let id = self.id.clone();
                let role = self.role;

                let fut = async move { router.route(&id, role, &data.content).await };
                ctx.wait(actix::fut::wrap_future::<_, Self>(fut).map(|report, act: &mut Self, ctx| {
                    act.send_frame(
                        ctx,
                        &ServerEvent::MessageStatus {
                            success_count: report.success_count,
                            failure_count: report.failure_count,
                        },
                    );
                }));
            }
            ClientCommand::Ping => {
                self.alive_at = Instant::now();
                self.send_frame(ctx, &ControlReply::Pong);
            }
        }
    }

    /// Role update: validate, then update the registry and the local
    /// session, replying `identified` / `connectionTypeUpdated`. An
    /// invalid role value or a vanished registry record produces an
    /// `{error}` reply; the connection stays open either way.
    fn handle_identify(
        &mut self,
        raw_role: &str,
        is_update: bool,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let role = match Role::parse(raw_role) {
            Some(role) => role,
            None => {
                self.send_frame(
                    ctx,
                    &ErrorFrame::new(format!(
                        "invalid connection type '{}', expected 'user' or 'admin'",
                        raw_role
                    )),
                );
                return;
            }
        };

        // The local table is authoritative for delivery; update it first so
        // a sendMessage right after the ack observes the new role even if
        // the registry write fails.
        self.role = role;
        self.sessions.set_role(&self.id, role);

        let registry = self.registry.clone();
        let id = self.id.clone();
        let fut = async move { registry.update_role(&id, role).await };

        ctx.wait(
            actix::fut::wrap_future::<_, Self>(fut).map(move |result, act: &mut Self, ctx| match result {
                Ok(()) => {
                    info!(id = %act.id, role = %role, "connection identified");
                    act.send_ack(role, is_update, ctx);
                }
                Err(RelayError::NotFound(_)) => {
                    act.send_frame(
                        ctx,
                        &ErrorFrame::new("connection is not registered, please reconnect"),
                    );
                }
                Err(e) => {
                    warn!(id = %act.id, error = %e, "registry role update failed, continuing");
                    act.send_ack(role, is_update, ctx);
                }
            }),
        );
    }

    fn send_ack(&self, role: Role, is_update: bool, ctx: &mut ws::WebsocketContext<Self>) {
        let event = if is_update {
            ServerEvent::ConnectionTypeUpdated {
                connection_type: role,
            }
        } else {
            ServerEvent::Identified {
                connection_type: role,
            }
        };
        self.send_frame(ctx, &event);
    }
}

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(id = %self.id, "connection accepted");

        self.alive_at = Instant::now();
        self.start_heartbeat(ctx);

        let addr = ctx.address();
        self.sessions.insert(
            self.id.clone(),
            addr.clone().recipient(),
            addr.recipient(),
            self.role,
        );

        // Register before acknowledging; a registry failure is logged and
        // the session continues on the local table alone.
        let registry = self.registry.clone();
        let id = self.id.clone();
        let role = self.role;
        let fut = async move { registry.register(&id, role, None).await };

        ctx.wait(
            actix::fut::wrap_future::<_, Self>(fut).map(|result, act: &mut Self, ctx| {
                if let Err(e) = result {
                    warn!(id = %act.id, error = %e, "registry register failed, continuing");
                }
                act.send_frame(
                    ctx,
                    &ServerEvent::Connection {
                        connection_id: act.id.clone(),
                    },
                );
            }),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(id = %self.id, "connection closed");
        self.sessions.remove(&self.id);

        let registry = self.registry.clone();
        let id = self.id.clone();
        actix::spawn(async move {
            if let Err(e) = registry.unregister(&id).await {
                warn!(id = %id, error = %e, "registry unregister failed");
            }
        });
    }
}

impl Handler<Outbound> for RelaySession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<ShutdownNotice> for RelaySession {
    type Result = ();

    fn handle(&mut self, _msg: ShutdownNotice, ctx: &mut Self::Context) {
        self.send_frame(ctx, &ServerEvent::ServerShutdown);
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Away)));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelaySession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.alive_at = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.alive_at = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.alive_at = Instant::now();
                self.dispatch_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!(id = %self.id, "binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(id = %self.id, ?reason, "close frame received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(id = %self.id, "continuation frames not supported");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                // A protocol error terminates only this connection; other
                // sessions and the server keep running.
                error!(id = %self.id, error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}
