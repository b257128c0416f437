//! Wire protocol for the relay WebSocket
//!
//! JSON frames in both directions. Inbound frames are dispatched on their
//! `action` field; outbound frames carry a `type` tag, except the `pong`
//! control reply (tagged by `action`, mirroring the client ping) and the
//! delivered message itself, which is a bare payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection role.
///
/// Producers ("user" on the wire) send messages; consumers ("admin") receive
/// them. Every connection starts as a producer until it identifies itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    Producer,
    #[serde(rename = "admin")]
    Consumer,
}

impl Role {
    /// The role messages from this role are delivered to.
    pub fn opposite(&self) -> Role {
        match self {
            Role::Producer => Role::Consumer,
            Role::Consumer => Role::Producer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "user",
            Role::Consumer => "admin",
        }
    }

    /// Parse a wire role value. Anything other than "user"/"admin" is
    /// rejected.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "user" => Some(Role::Producer),
            "admin" => Some(Role::Consumer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `sendMessage` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub content: String,
}

/// Commands sent from clients over the WebSocket.
///
/// Frames with an unrecognized `action` fail this parse and are ignored by
/// the session (logged, connection stays open); frames with a recognized
/// action but a bad shape produce an `{error}` reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Declare the connection role.
    Identify {
        #[serde(rename = "type")]
        connection_type: String,
    },

    /// Alias of `identify` with its own acknowledgement frame.
    SetConnectionType {
        #[serde(rename = "type")]
        connection_type: String,
    },

    /// Relay a message to the opposite role.
    SendMessage { data: MessageBody },

    /// Application-level keepalive.
    Ping,
}

impl ClientCommand {
    /// Actions this server understands.
    pub const KNOWN_ACTIONS: [&'static str; 4] =
        ["identify", "setConnectionType", "sendMessage", "ping"];
}

/// Events sent from the server, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Connection accepted, carries the server-assigned id.
    Connection {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },

    /// Reply to `identify`.
    Identified {
        #[serde(rename = "connectionType")]
        connection_type: Role,
    },

    /// Reply to `setConnectionType`.
    ConnectionTypeUpdated {
        #[serde(rename = "connectionType")]
        connection_type: Role,
    },

    /// Outcome of a `sendMessage`.
    MessageStatus {
        #[serde(rename = "successCount")]
        success_count: u32,
        #[serde(rename = "failureCount")]
        failure_count: u32,
    },

    /// The server is shutting down; clients should reconnect with backoff.
    ServerShutdown,
}

/// Control replies tagged by `action`, mirroring the client's frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlReply {
    Pong,
}

/// Structured error frame. Failures are always reported on the socket,
/// never by silently dropping the connection.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    pub error: String,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// A message delivered to the opposite role.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveredMessage {
    pub content: String,
    pub from: Role,
    #[serde(rename = "connectionId")]
    pub connection_id: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_and_opposite() {
        assert_eq!(Role::parse("user"), Some(Role::Producer));
        assert_eq!(Role::parse("admin"), Some(Role::Consumer));
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::Producer.opposite(), Role::Consumer);
        assert_eq!(Role::Consumer.opposite(), Role::Producer);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Producer).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Consumer).unwrap(), "\"admin\"");
    }

    #[test]
    fn test_identify_command_parse() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"action":"identify","type":"admin"}"#).unwrap();
        match cmd {
            ClientCommand::Identify { connection_type } => assert_eq!(connection_type, "admin"),
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_send_message_command_parse() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"action":"sendMessage","data":{"content":"hello"},"timestamp":1234}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::SendMessage { data } => assert_eq!(data.content, "hello"),
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_unknown_action_fails_parse() {
        let result = serde_json::from_str::<ClientCommand>(r#"{"action":"subscribe"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_event_shape() {
        let json = serde_json::to_string(&ServerEvent::Connection {
            connection_id: "abc".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"connection\""));
        assert!(json.contains("\"connectionId\":\"abc\""));
    }

    #[test]
    fn test_identified_event_shape() {
        let json = serde_json::to_string(&ServerEvent::Identified {
            connection_type: Role::Consumer,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"identified\""));
        assert!(json.contains("\"connectionType\":\"admin\""));
    }

    #[test]
    fn test_connection_type_updated_shape() {
        let json = serde_json::to_string(&ServerEvent::ConnectionTypeUpdated {
            connection_type: Role::Producer,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"connectionTypeUpdated\""));
    }

    #[test]
    fn test_message_status_shape() {
        let json = serde_json::to_string(&ServerEvent::MessageStatus {
            success_count: 1,
            failure_count: 0,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"messageStatus\""));
        assert!(json.contains("\"successCount\":1"));
        assert!(json.contains("\"failureCount\":0"));
    }

    #[test]
    fn test_server_shutdown_shape() {
        let json = serde_json::to_string(&ServerEvent::ServerShutdown).unwrap();
        assert_eq!(json, r#"{"type":"serverShutdown"}"#);
    }

    #[test]
    fn test_pong_shape() {
        let json = serde_json::to_string(&ControlReply::Pong).unwrap();
        assert_eq!(json, r#"{"action":"pong"}"#);
    }

    #[test]
    fn test_delivered_message_shape() {
        let msg = DeliveredMessage {
            content: "hello".to_string(),
            from: Role::Producer,
            connection_id: "conn-a".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"content\":\"hello\""));
        assert!(json.contains("\"from\":\"user\""));
        assert!(json.contains("\"connectionId\":\"conn-a\""));
        assert!(json.contains("\"timestamp\""));
        // A delivered message is a bare payload, not a tagged event.
        assert!(!json.contains("\"type\""));
    }

    #[test]
    fn test_error_frame_shape() {
        let json = serde_json::to_string(&ErrorFrame::new("invalid connection type")).unwrap();
        assert_eq!(json, r#"{"error":"invalid connection type"}"#);
    }
}
