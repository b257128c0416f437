//! End-to-end relay tests over real WebSocket connections
//!
//! Spins up the actual actix app with the in-memory registry and drives it
//! with WebSocket clients: identify, send, delivery, error replies, and the
//! shutdown notice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{web, App};
use awc::ws::{Frame, Message};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};

use message_relay_service::monitor::BackendMonitor;
use message_relay_service::protocol::Role;
use message_relay_service::registry::{ConnectionRegistry, InMemoryRegistry};
use message_relay_service::router::{BroadcastRouter, DeliveryPolicy};
use message_relay_service::server::AppState;
use message_relay_service::sessions::{SessionTable, ShutdownNotice};

/// Concrete client connection type, so helpers can hold several
/// connections to the same test server at once.
type WsClient = actix_codec::Framed<awc::BoxedSocket, awc::ws::Codec>;

struct TestRelay {
    srv: actix_test::TestServer,
    registry: Arc<InMemoryRegistry>,
    sessions: Arc<SessionTable>,
}

fn start_relay() -> TestRelay {
    let registry = Arc::new(InMemoryRegistry::new(Duration::from_secs(60)));
    let sessions = Arc::new(SessionTable::new());

    let registry_dyn: Arc<dyn ConnectionRegistry> = registry.clone();
    let router = Arc::new(BroadcastRouter::new(
        registry_dyn.clone(),
        sessions.clone(),
        DeliveryPolicy::FirstSuccess,
    ));

    let data = web::Data::new(AppState {
        registry: registry_dyn,
        sessions: sessions.clone(),
        router,
        monitor: Arc::new(BackendMonitor::new()),
        started_at: Instant::now(),
    });

    let srv = actix_test::start(move || {
        App::new()
            .app_data(data.clone())
            .service(message_relay_service::server::websocket)
    });

    TestRelay {
        srv,
        registry,
        sessions,
    }
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed unexpectedly")
            .expect("websocket error");

        match frame {
            Frame::Text(bytes) => return serde_json::from_slice(&bytes).unwrap(),
            Frame::Ping(_) | Frame::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Wait for a text frame, returning None on timeout.
async fn try_next_json(ws: &mut WsClient, wait: Duration) -> Option<Value> {
    tokio::time::timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(Frame::Text(bytes))) => {
                    return Some(serde_json::from_slice::<Value>(&bytes).unwrap())
                }
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Connect and consume the connection acknowledgement, returning the
/// assigned id.
async fn connect(relay: &mut TestRelay) -> (WsClient, String) {
    let url = relay.srv.url("/ws");
    let (_resp, mut ws) = awc::Client::new().ws(url).connect().await.unwrap();
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "connection");
    let id = ack["connectionId"].as_str().unwrap().to_string();
    (ws, id)
}

async fn identify(ws: &mut WsClient, role: &str) {
    send_json(ws, json!({"action": "identify", "type": role})).await;
    let reply = next_json(ws).await;
    assert_eq!(reply["type"], "identified");
    assert_eq!(reply["connectionType"], role);
}

#[actix_rt::test]
async fn connection_ack_registers_default_producer() {
    let mut relay = start_relay();
    let (_ws, id) = connect(&mut relay).await;

    assert!(relay.registry.exists(&id).await.unwrap());
    let record = relay.registry.get(&id).await.unwrap().unwrap();
    assert_eq!(record.role, Role::Producer);
    assert_eq!(relay.sessions.count(), 1);
}

#[actix_rt::test]
async fn end_to_end_user_message_reaches_admin() {
    let mut relay = start_relay();

    let (mut user, user_id) = connect(&mut relay).await;
    let (mut admin, _admin_id) = connect(&mut relay).await;

    identify(&mut user, "user").await;
    identify(&mut admin, "admin").await;

    send_json(
        &mut user,
        json!({"action": "sendMessage", "data": {"content": "hello"}}),
    )
    .await;

    let delivered = next_json(&mut admin).await;
    assert_eq!(delivered["content"], "hello");
    assert_eq!(delivered["from"], "user");
    assert_eq!(delivered["connectionId"], user_id.as_str());
    assert!(delivered["timestamp"].is_string());

    let status = next_json(&mut user).await;
    assert_eq!(status["type"], "messageStatus");
    assert_eq!(status["successCount"], 1);
    assert_eq!(status["failureCount"], 0);
}

#[actix_rt::test]
async fn message_with_no_recipients_reports_zero_counts() {
    let mut relay = start_relay();
    let (mut user, _id) = connect(&mut relay).await;
    identify(&mut user, "user").await;

    send_json(
        &mut user,
        json!({"action": "sendMessage", "data": {"content": "anyone?"}}),
    )
    .await;

    let status = next_json(&mut user).await;
    assert_eq!(status["type"], "messageStatus");
    assert_eq!(status["successCount"], 0);
    assert_eq!(status["failureCount"], 0);
}

#[actix_rt::test]
async fn exactly_one_of_two_admins_receives_a_message() {
    let mut relay = start_relay();

    let (mut user, _user_id) = connect(&mut relay).await;
    let (mut admin_a, _a) = connect(&mut relay).await;
    let (mut admin_b, _b) = connect(&mut relay).await;

    identify(&mut user, "user").await;
    identify(&mut admin_a, "admin").await;
    identify(&mut admin_b, "admin").await;

    send_json(
        &mut user,
        json!({"action": "sendMessage", "data": {"content": "one of you"}}),
    )
    .await;

    let status = next_json(&mut user).await;
    assert_eq!(status["successCount"], 1);

    let got_a = try_next_json(&mut admin_a, Duration::from_millis(300)).await;
    let got_b = try_next_json(&mut admin_b, Duration::from_millis(300)).await;
    let received = [&got_a, &got_b].iter().filter(|f| f.is_some()).count();
    assert_eq!(received, 1, "exactly one admin must receive the message");
}

#[actix_rt::test]
async fn set_connection_type_has_its_own_ack() {
    let mut relay = start_relay();
    let (mut ws, id) = connect(&mut relay).await;

    send_json(
        &mut ws,
        json!({"action": "setConnectionType", "type": "admin"}),
    )
    .await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "connectionTypeUpdated");
    assert_eq!(reply["connectionType"], "admin");

    let record = relay.registry.get(&id).await.unwrap().unwrap();
    assert_eq!(record.role, Role::Consumer);
}

#[actix_rt::test]
async fn invalid_role_gets_error_and_connection_stays_open() {
    let mut relay = start_relay();
    let (mut ws, _id) = connect(&mut relay).await;

    send_json(&mut ws, json!({"action": "identify", "type": "superuser"})).await;
    let reply = next_json(&mut ws).await;
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .contains("invalid connection type"));

    // Still open and serving.
    send_json(&mut ws, json!({"action": "ping"})).await;
    let pong = next_json(&mut ws).await;
    assert_eq!(pong["action"], "pong");
}

#[actix_rt::test]
async fn malformed_json_gets_error_frame() {
    let mut relay = start_relay();
    let (mut ws, _id) = connect(&mut relay).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert!(reply["error"].as_str().unwrap().contains("malformed"));
}

#[actix_rt::test]
async fn unrecognized_action_is_ignored() {
    let mut relay = start_relay();
    let (mut ws, _id) = connect(&mut relay).await;

    send_json(&mut ws, json!({"action": "subscribe", "channel": "x"})).await;

    // No reply for the unknown action; the next frame answered is the ping.
    send_json(&mut ws, json!({"action": "ping"})).await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["action"], "pong");
}

#[actix_rt::test]
async fn disconnect_unregisters_connection() {
    let mut relay = start_relay();
    let (ws, id) = connect(&mut relay).await;
    assert!(relay.registry.exists(&id).await.unwrap());

    drop(ws);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(relay.sessions.count(), 0);
    assert!(!relay.registry.exists(&id).await.unwrap());
}

#[actix_rt::test]
async fn shutdown_notice_reaches_sessions_before_close() {
    let mut relay = start_relay();
    let (mut ws, _id) = connect(&mut relay).await;

    for control in relay.sessions.controls() {
        control.do_send(ShutdownNotice);
    }

    let notice = next_json(&mut ws).await;
    assert_eq!(notice["type"], "serverShutdown");

    // The close frame follows the notice.
    let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended")
        .expect("websocket error");
    assert!(matches!(frame, Frame::Close(_)));
}
