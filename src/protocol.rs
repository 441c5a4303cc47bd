// file: src/protocol.rs
// description: Engine.IO v4 / Socket.IO v5 text packet codec for the push channel
// reference: https://socket.io/docs/v4/socket-io-protocol/

use crate::error::TaskMasterError;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Parameters the server sends in its `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// Upper bound on the liveness window, whatever the server announces.
pub const MAX_LIVENESS_WINDOW: Duration = Duration::from_secs(600);

impl Handshake {
    /// Silence longer than this means the connection is dead.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
            .min(MAX_LIVENESS_WINDOW)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { sid: Option<String> },
    Disconnect,
    Event { name: String, data: Value },
    ConnectError { message: String },
}

fn invalid(what: &str, raw: &str) -> TaskMasterError {
    TaskMasterError::InvalidMessage(format!(
        "{}: {}",
        what,
        raw.chars().take(100).collect::<String>()
    ))
}

impl EnginePacket {
    pub fn decode(raw: &str) -> Result<Self, TaskMasterError> {
        let mut chars = raw.chars();
        let kind = chars.next().ok_or_else(|| invalid("empty packet", raw))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping),
            '3' => Ok(EnginePacket::Pong),
            '4' => Ok(EnginePacket::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            _ => Err(invalid("unknown engine packet", raw)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(h) => format!(
                "0{}",
                serde_json::json!({
                    "sid": h.sid,
                    "pingInterval": h.ping_interval,
                    "pingTimeout": h.ping_timeout,
                })
            ),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping => "2".to_string(),
            EnginePacket::Pong => "3".to_string(),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Skips an optional `/namespace,` prefix and an optional ack id.
fn strip_envelope(body: &str) -> &str {
    let body = match body.strip_prefix('/') {
        Some(ns) => ns.split_once(',').map(|(_, rest)| rest).unwrap_or(""),
        None => body,
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

impl SocketPacket {
    pub fn decode(raw: &str) -> Result<Self, TaskMasterError> {
        let mut chars = raw.chars();
        let kind = chars.next().ok_or_else(|| invalid("empty socket packet", raw))?;
        let body = strip_envelope(chars.as_str());

        match kind {
            '0' => {
                let sid = if body.is_empty() {
                    None
                } else {
                    serde_json::from_str::<Value>(body)?
                        .get("sid")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                };
                Ok(SocketPacket::Connect { sid })
            }
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let mut args = match serde_json::from_str::<Value>(body)? {
                    Value::Array(args) => args.into_iter(),
                    _ => return Err(invalid("event payload is not an array", raw)),
                };
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(invalid("event without a name", raw)),
                };
                Ok(SocketPacket::Event {
                    name,
                    data: args.next().unwrap_or(Value::Null),
                })
            }
            '4' => {
                let message = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| body.to_string());
                Ok(SocketPacket::ConnectError { message })
            }
            _ => Err(invalid("unsupported socket packet", raw)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect { sid: None } => "0".to_string(),
            SocketPacket::Connect { sid: Some(sid) } => {
                format!("0{}", serde_json::json!({ "sid": sid }))
            }
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, data } => {
                format!("2{}", Value::Array(vec![Value::String(name.clone()), data.clone()]))
            }
            SocketPacket::ConnectError { message } => {
                format!("4{}", serde_json::json!({ "message": message }))
            }
        }
    }
}

/// `42["register","<id>"]`
pub fn register_frame(identity_id: &str) -> String {
    EnginePacket::Message(SocketPacket::Event {
        name: "register".to_string(),
        data: Value::String(identity_id.to_string()),
    })
    .encode()
}

/// `40`
pub fn namespace_connect_frame() -> String {
    EnginePacket::Message(SocketPacket::Connect { sid: None }).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let packet =
            EnginePacket::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":300,"pingTimeout":200,"maxPayload":1000000}"#)
                .unwrap();
        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "abc");
        assert_eq!(handshake.liveness_window(), Duration::from_millis(500));
    }

    #[test]
    fn liveness_window_is_capped_for_huge_ping_settings() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","pingInterval":18446744073709551615,"pingTimeout":20000}"#,
        )
        .unwrap();
        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.liveness_window(), MAX_LIVENESS_WINDOW);

        let slow = Handshake {
            sid: "s".into(),
            ping_interval: 500_000,
            ping_timeout: 200_000,
        };
        assert_eq!(slow.liveness_window(), MAX_LIVENESS_WINDOW);
    }

    #[test]
    fn decodes_event_with_payload() {
        let packet = EnginePacket::decode(
            r#"42["task-deleted",{"message":"gone","taskId":"t1"}]"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                name: "task-deleted".into(),
                data: json!({"message": "gone", "taskId": "t1"}),
            })
        );
    }

    #[test]
    fn tolerates_namespace_and_ack_id() {
        let packet = SocketPacket::decode(r#"2/admin,17["task-updated",{}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "task-updated".into(),
                data: json!({}),
            }
        );
    }

    #[test]
    fn decodes_connect_ack_and_error() {
        assert_eq!(
            SocketPacket::decode(r#"0{"sid":"s1"}"#).unwrap(),
            SocketPacket::Connect {
                sid: Some("s1".into())
            }
        );
        assert_eq!(
            SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap(),
            SocketPacket::ConnectError {
                message: "Not authorized".into()
            }
        );
    }

    #[test]
    fn encodes_client_frames() {
        assert_eq!(namespace_connect_frame(), "40");
        assert_eq!(register_frame("u1"), r#"42["register","u1"]"#);
        assert_eq!(EnginePacket::Pong.encode(), "3");
    }

    #[test]
    fn rejects_malformed_packets() {
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode(r#"42{"not":"array"}"#).is_err());
        assert!(EnginePacket::decode("42[1,2]").is_err());
    }
}
