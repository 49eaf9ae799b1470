//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type
//! digit followed by an optional payload. Type `4` (message) carries a
//! Socket.IO packet, which again starts with a type digit, then an
//! optional `/namespace,` prefix, an optional acknowledgement id and a
//! JSON payload:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   open
//! 2 / 3                                                    ping / pong
//! 40{"sid":".."}                                           namespace connect
//! 42["monitorList",{..}]                                   event
//! 4212["login",{..}]                                       event expecting ack 12
//! 4312[{"ok":true}]                                        ack 12
//! ```
//!
//! Binary attachments (types `45`/`46`) are not supported.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── OpenInfo ─────────────────────────────────────────────────────────

/// Handshake parameters from the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,

    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Milliseconds between server pings.
    pub ping_interval: u64,

    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenInfo {
    /// How long the client may go without a ping before the
    /// connection is considered dead.
    pub fn ping_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

// ── Engine.IO ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, Error> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty frame".into()))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_owned())),
            '3' => Ok(Self::Pong(body.to_owned())),
            '4' => SocketPacket::decode(body).map(Self::Message),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::Protocol(format!(
                "unknown Engine.IO packet type '{other}'"
            ))),
        }
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(match self {
            Self::Open(info) => format!("0{}", serde_json::to_string(info)?),
            Self::Close => "1".to_owned(),
            Self::Ping(payload) => format!("2{payload}"),
            Self::Pong(payload) => format!("3{payload}"),
            Self::Message(packet) => format!("4{}", packet.encode()?),
            Self::Upgrade => "5".to_owned(),
            Self::Noop => "6".to_owned(),
        })
    }
}

// ── Socket.IO ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect. Client → server carries optional auth data,
    /// server → client carries `{"sid": ..}`.
    Connect(Option<Value>),
    Disconnect,
    Event {
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

impl SocketPacket {
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Event {
            id: None,
            name: name.into(),
            args,
        }
    }

    pub fn decode(body: &str) -> Result<Self, Error> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty Socket.IO packet".into()))?;
        let rest = strip_namespace(chars.as_str());

        match kind {
            '0' => Ok(Self::Connect(parse_optional(rest)?)),
            '1' => Ok(Self::Disconnect),
            '2' => {
                let (id, data) = split_ack_id(rest)?;
                let mut args = parse_args(data)?.into_iter();
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    Some(other) => {
                        return Err(Error::Protocol(format!(
                            "event name must be a string, got {other}"
                        )));
                    }
                    None => return Err(Error::Protocol("event without a name".into())),
                };
                Ok(Self::Event {
                    id,
                    name,
                    args: args.collect(),
                })
            }
            '3' => {
                let (id, data) = split_ack_id(rest)?;
                let id = id.ok_or_else(|| Error::Protocol("ack without an id".into()))?;
                Ok(Self::Ack {
                    id,
                    args: parse_args(data)?,
                })
            }
            '4' => Ok(Self::ConnectError(
                parse_optional(rest)?.unwrap_or(Value::Null),
            )),
            '5' | '6' => Err(Error::Protocol(
                "binary Socket.IO packets are not supported".into(),
            )),
            other => Err(Error::Protocol(format!(
                "unknown Socket.IO packet type '{other}'"
            ))),
        }
    }

    pub fn encode(&self) -> Result<String, Error> {
        let mut out = String::new();
        match self {
            Self::Connect(auth) => {
                out.push('0');
                if let Some(auth) = auth {
                    out.push_str(&serde_json::to_string(auth)?);
                }
            }
            Self::Disconnect => out.push('1'),
            Self::Event { id, name, args } => {
                out.push('2');
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut data = Vec::with_capacity(args.len() + 1);
                data.push(Value::String(name.clone()));
                data.extend(args.iter().cloned());
                out.push_str(&serde_json::to_string(&data)?);
            }
            Self::Ack { id, args } => {
                out.push('3');
                out.push_str(&id.to_string());
                out.push_str(&serde_json::to_string(args)?);
            }
            Self::ConnectError(data) => {
                out.push('4');
                out.push_str(&serde_json::to_string(data)?);
            }
        }
        Ok(out)
    }
}

/// Human-readable message from a connect error payload.
pub fn connect_error_message(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .map_or_else(|| data.to_string(), str::to_owned)
}

// ── Parsing helpers ──────────────────────────────────────────────────

/// Drop a `/namespace,` prefix. Only the default namespace is used,
/// so the name itself is ignored.
fn strip_namespace(rest: &str) -> &str {
    if !rest.starts_with('/') {
        return rest;
    }
    rest.split_once(',').map_or("", |(_, tail)| tail)
}

fn split_ack_id(rest: &str) -> Result<(Option<u64>, &str), Error> {
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return Ok((None, rest));
    }
    let (digits, data) = rest.split_at(end);
    let id = digits
        .parse::<u64>()
        .map_err(|e| Error::Protocol(format!("invalid ack id '{digits}': {e}")))?;
    Ok((Some(id), data))
}

fn parse_args(data: &str) -> Result<Vec<Value>, Error> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(data)?)
}

fn parse_optional(data: &str) -> Result<Option<Value>, Error> {
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(data)?))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decode_open_packet() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let EnginePacket::Open(info) = EnginePacket::decode(frame).unwrap() else {
            panic!("expected open packet");
        };
        assert_eq!(info.sid, "abc");
        assert_eq!(info.ping_deadline(), Duration::from_millis(45_000));
        assert_eq!(info.max_payload, Some(1_000_000));
    }

    #[test]
    fn decode_ping_and_close() {
        assert_eq!(
            EnginePacket::decode("2").unwrap(),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(
            EnginePacket::decode("2probe").unwrap(),
            EnginePacket::Ping("probe".into())
        );
        assert_eq!(EnginePacket::decode("1").unwrap(), EnginePacket::Close);
    }

    #[test]
    fn decode_event_without_ack() {
        let packet = EnginePacket::decode(r#"42["monitorList",{"1":{"id":1}}]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                id: None,
                name: "monitorList".into(),
                args: vec![json!({"1": {"id": 1}})],
            })
        );
    }

    #[test]
    fn decode_event_with_ack_id_and_namespace() {
        let packet = SocketPacket::decode(r#"2/admin,17["ping",{}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                id: Some(17),
                name: "ping".into(),
                args: vec![json!({})],
            }
        );
    }

    #[test]
    fn decode_event_without_args() {
        let packet = SocketPacket::decode(r#"2["loginRequired"]"#).unwrap();
        assert_eq!(packet, SocketPacket::event("loginRequired", Vec::new()));
    }

    #[test]
    fn decode_ack() {
        let packet = SocketPacket::decode(r#"312[{"ok":true,"msg":"done"}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Ack {
                id: 12,
                args: vec![json!({"ok": true, "msg": "done"})],
            }
        );
    }

    #[test]
    fn decode_connect_variants() {
        assert_eq!(
            SocketPacket::decode("0").unwrap(),
            SocketPacket::Connect(None)
        );
        assert_eq!(
            SocketPacket::decode(r#"0{"sid":"x"}"#).unwrap(),
            SocketPacket::Connect(Some(json!({"sid": "x"})))
        );
        let err = SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap();
        let SocketPacket::ConnectError(data) = err else {
            panic!("expected connect error");
        };
        assert_eq!(connect_error_message(&data), "Not authorized");
    }

    #[test]
    fn encode_event_with_ack_id() {
        let packet = EnginePacket::Message(SocketPacket::Event {
            id: Some(3),
            name: "login".into(),
            args: vec![json!({"username": "admin"})],
        });
        assert_eq!(
            packet.encode().unwrap(),
            r#"423["login",{"username":"admin"}]"#
        );
    }

    #[test]
    fn encode_connect_and_pong() {
        assert_eq!(
            EnginePacket::Message(SocketPacket::Connect(None))
                .encode()
                .unwrap(),
            "40"
        );
        assert_eq!(EnginePacket::Pong(String::new()).encode().unwrap(), "3");
    }

    #[test]
    fn rejects_binary_and_garbage() {
        assert!(matches!(
            EnginePacket::decode(r#"451-["upload",{"_placeholder":true,"num":0}]"#),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(EnginePacket::decode(""), Err(Error::Protocol(_))));
        assert!(matches!(EnginePacket::decode("x"), Err(Error::Protocol(_))));
        assert!(matches!(
            SocketPacket::decode("2[42]"),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            SocketPacket::decode("3[{}]"),
            Err(Error::Protocol(_))
        ));
    }
}
