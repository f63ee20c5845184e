//! Engine.IO v4 / Socket.IO v5 text packet codec
//!
//! Only the text encoding is supported. Binary attachments are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default Socket.IO namespace
pub const DEFAULT_NAMESPACE: &str = "/";

/// Errors produced while decoding a packet
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },

    #[error("binary attachments are not supported")]
    BinaryUnsupported,

    #[error("invalid open handshake: {0}")]
    Handshake(#[source] serde_json::Error),

    #[error("invalid packet payload: {0}")]
    Json(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine.IO
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of the Engine.IO OPEN packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => serde_json::from_str(rest)
                .map(EnginePacket::Open)
                .map_err(PacketError::Handshake),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => SocketPacket::decode(rest).map(EnginePacket::Message),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(PacketError::UnknownType {
                layer: "engine.io",
                kind: other,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            // Handshake only holds strings and integers
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket.IO
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl SocketPacketKind {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '0' => Self::Connect,
            '1' => Self::Disconnect,
            '2' => Self::Event,
            '3' => Self::Ack,
            '4' => Self::ConnectError,
            '5' => Self::BinaryEvent,
            '6' => Self::BinaryAck,
            _ => return None,
        })
    }

    fn as_char(&self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }
}

/// Application-level packet carried inside an Engine.IO MESSAGE
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    pub fn connect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketKind::Connect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: None,
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketKind::Disconnect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: None,
        }
    }

    /// Build an EVENT packet: `["name", ...args]`
    pub fn event(namespace: &str, name: &str, args: Vec<Value>) -> Self {
        let mut payload = Vec::with_capacity(args.len() + 1);
        payload.push(Value::String(name.to_string()));
        payload.extend(args);

        Self {
            kind: SocketPacketKind::Event,
            namespace: namespace.to_string(),
            ack_id: None,
            data: Some(Value::Array(payload)),
        }
    }

    /// Split an EVENT packet into its name and arguments
    pub fn as_event(&self) -> Option<(&str, &[Value])> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        let items = self.data.as_ref()?.as_array()?;
        let (name, args) = items.split_first()?;
        Some((name.as_str()?, args))
    }

    /// Human-readable message of a CONNECT_ERROR packet
    pub fn error_message(&self) -> Option<String> {
        match self.data.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let c = chars.next().ok_or(PacketError::Empty)?;
        let kind = SocketPacketKind::from_char(c).ok_or(PacketError::UnknownType {
            layer: "socket.io",
            kind: c,
        })?;
        if matches!(kind, SocketPacketKind::BinaryEvent | SocketPacketKind::BinaryAck) {
            return Err(PacketError::BinaryUnsupported);
        }

        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let ns = &rest[..idx];
                    rest = &rest[idx + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits].parse::<u64>().ok();
            rest = &rest[digits..];
            id
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace,
            ack_id,
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());

        if self.namespace != DEFAULT_NAMESPACE && !self.namespace.is_empty() {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(ref data) = self.data {
            out.push_str(&data.to_string());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();

        match packet {
            EnginePacket::Open(h) => {
                assert_eq!(h.sid, "abc");
                assert_eq!(h.ping_interval, 25000);
                assert_eq!(h.ping_timeout, 20000);
                assert_eq!(h.max_payload, Some(1_000_000));
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_handshake_is_error() {
        let err = EnginePacket::decode("0not json").unwrap_err();
        assert!(matches!(err, PacketError::Handshake(_)));
    }

    #[test]
    fn test_ping_pong() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::Pong("ping-data".to_string()).encode(), "3ping-data");
    }

    #[test]
    fn test_install_event_wire_format() {
        let packet = SocketPacket::event("/", "install_model", vec![json!("llama3")]);
        assert_eq!(
            EnginePacket::Message(packet).encode(),
            r#"42["install_model","llama3"]"#
        );
    }

    #[test]
    fn test_event_in_custom_namespace() {
        let packet = SocketPacket::event("/installer", "install_model", vec![json!("x")]);
        assert_eq!(packet.encode(), r#"2/installer,["install_model","x"]"#);

        let decoded = SocketPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.namespace, "/installer");
        assert_eq!(decoded.as_event().unwrap().0, "install_model");
    }

    #[test]
    fn test_decode_progress_event() {
        let packet = EnginePacket::decode(r#"42["progress","Downloading weights..."]"#).unwrap();
        let EnginePacket::Message(msg) = packet else {
            panic!("expected message");
        };
        let (name, args) = msg.as_event().unwrap();
        assert_eq!(name, "progress");
        assert_eq!(args, &[json!("Downloading weights...")]);
    }

    #[test]
    fn test_decode_event_with_ack_id() {
        let msg = SocketPacket::decode(r#"212["progress","x"]"#).unwrap();
        assert_eq!(msg.ack_id, Some(12));
        assert_eq!(msg.as_event().unwrap().0, "progress");
    }

    #[test]
    fn test_connect_packets() {
        assert_eq!(SocketPacket::connect("/").encode(), "0");
        assert_eq!(SocketPacket::connect("/admin").encode(), "0/admin,");

        let ack = SocketPacket::decode(r#"0{"sid":"xyz"}"#).unwrap();
        assert_eq!(ack.kind, SocketPacketKind::Connect);
        assert_eq!(ack.namespace, "/");
    }

    #[test]
    fn test_connect_error_message() {
        let err = SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap();
        assert_eq!(err.kind, SocketPacketKind::ConnectError);
        assert_eq!(err.error_message().as_deref(), Some("Not authorized"));
    }

    #[test]
    fn test_namespace_without_trailing_comma() {
        let msg = SocketPacket::decode("1/admin").unwrap();
        assert_eq!(msg.kind, SocketPacketKind::Disconnect);
        assert_eq!(msg.namespace, "/admin");
        assert!(msg.data.is_none());
    }

    #[test]
    fn test_binary_rejected() {
        let err = SocketPacket::decode(r#"51-["upload",{"_placeholder":true,"num":0}]"#).unwrap_err();
        assert!(matches!(err, PacketError::BinaryUnsupported));
    }

    #[test]
    fn test_unknown_types() {
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(PacketError::UnknownType { layer: "engine.io", kind: '9' })
        ));
        assert!(matches!(
            SocketPacket::decode("x"),
            Err(PacketError::UnknownType { layer: "socket.io", kind: 'x' })
        ));
        assert!(matches!(EnginePacket::decode(""), Err(PacketError::Empty)));
    }

    #[test]
    fn test_non_event_has_no_event_parts() {
        let msg = SocketPacket::decode(r#"3["ok"]"#).unwrap();
        assert!(msg.as_event().is_none());
    }
}
