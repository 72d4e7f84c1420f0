//! Text-frame codec for the event broker (Engine.IO 4 / Socket.IO 5).
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type digit
//! followed by its data. Engine.IO `message` packets (`4`) carry a
//! Socket.IO packet:
//!
//! ```text
//! <type>[<namespace>,][<ack id>][<json>]
//! ```
//!
//! Only the packets this client exchanges are modelled. Binary packets are
//! rejected as unsupported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Errors produced while decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The frame was empty.
    #[error("empty frame")]
    Empty,
    /// The leading type digit is not a known packet type.
    #[error("unknown {layer} packet type {found:?}")]
    UnknownType {
        /// Which protocol layer rejected the frame.
        layer: &'static str,
        /// The offending character.
        found: char,
    },
    /// The packet type is valid but this client does not handle it.
    #[error("unsupported packet: {0}")]
    Unsupported(&'static str),
    /// The JSON portion could not be parsed.
    #[error("malformed packet data: {0}")]
    Json(#[from] serde_json::Error),
    /// The structure of the packet is wrong (e.g. event without a name).
    #[error("malformed packet: {0}")]
    Malformed(String),
}

/// Handshake data sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the connection may upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,
    /// Time the server waits for a pong, in milliseconds.
    pub ping_timeout: u64,
    /// Maximum payload size accepted by the server.
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// `0`: session opened.
    Open(Handshake),
    /// `1`: transport closing.
    Close,
    /// `2`: heartbeat ping, optionally with probe data.
    Ping(Option<String>),
    /// `3`: heartbeat pong.
    Pong(Option<String>),
    /// `4`: a Socket.IO packet.
    Message(SocketPacket),
    /// `5`: transport upgrade.
    Upgrade,
    /// `6`: no-op.
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// `0`: connect to a namespace; client sends auth data, server its sid.
    Connect {
        /// Namespace.
        namespace: String,
        /// Auth payload (client) or `{ sid }` (server).
        data: Option<Value>,
    },
    /// `1`: leave a namespace.
    Disconnect {
        /// Namespace.
        namespace: String,
    },
    /// `2`: an event with its first argument as payload.
    Event {
        /// Namespace.
        namespace: String,
        /// Event name.
        name: String,
        /// First argument, or `Null` if the event had none.
        payload: Value,
        /// Acknowledgement id, if the sender expects an ack.
        ack_id: Option<u64>,
    },
    /// `3`: acknowledgement of an event.
    Ack {
        /// Namespace.
        namespace: String,
        /// Acknowledged id.
        ack_id: u64,
        /// Ack arguments.
        args: Vec<Value>,
    },
    /// `4`: the server refused the namespace connection.
    ConnectError {
        /// Namespace.
        namespace: String,
        /// Human-readable reason.
        message: String,
    },
}

impl SocketPacket {
    /// Builds a connect packet for the default namespace carrying `auth`.
    #[must_use]
    pub fn connect(auth: Option<Value>) -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: auth,
        }
    }

    /// Builds an event packet for the default namespace.
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            name: name.into(),
            payload,
            ack_id: None,
        }
    }

    const fn type_digit(&self) -> char {
        match self {
            Self::Connect { .. } => '0',
            Self::Disconnect { .. } => '1',
            Self::Event { .. } => '2',
            Self::Ack { .. } => '3',
            Self::ConnectError { .. } => '4',
        }
    }

    fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }
}

/// Encodes an Engine.IO packet as a WebSocket text frame.
///
/// # Errors
///
/// Returns [`PacketError::Json`] if a payload cannot be serialized.
pub fn encode(packet: &EnginePacket) -> Result<String, PacketError> {
    Ok(match packet {
        EnginePacket::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping(probe) => format!("2{}", probe.as_deref().unwrap_or_default()),
        EnginePacket::Pong(probe) => format!("3{}", probe.as_deref().unwrap_or_default()),
        EnginePacket::Message(socket) => format!("4{}", encode_socket(socket)?),
        EnginePacket::Upgrade => "5".to_string(),
        EnginePacket::Noop => "6".to_string(),
    })
}

fn encode_socket(packet: &SocketPacket) -> Result<String, PacketError> {
    let mut out = String::new();
    out.push(packet.type_digit());
    let namespace = packet.namespace();
    if namespace != DEFAULT_NAMESPACE {
        out.push_str(namespace);
        out.push(',');
    }
    match packet {
        SocketPacket::Connect { data, .. } => {
            if let Some(data) = data {
                out.push_str(&serde_json::to_string(data)?);
            }
        }
        SocketPacket::Disconnect { .. } => {}
        SocketPacket::Event {
            name,
            payload,
            ack_id,
            ..
        } => {
            if let Some(id) = ack_id {
                out.push_str(&id.to_string());
            }
            let args = if payload.is_null() {
                serde_json::json!([name])
            } else {
                serde_json::json!([name, payload])
            };
            out.push_str(&serde_json::to_string(&args)?);
        }
        SocketPacket::Ack { ack_id, args, .. } => {
            out.push_str(&ack_id.to_string());
            out.push_str(&serde_json::to_string(args)?);
        }
        SocketPacket::ConnectError { message, .. } => {
            out.push_str(&serde_json::to_string(&serde_json::json!({ "message": message }))?);
        }
    }
    Ok(out)
}

/// Decodes a WebSocket text frame into an Engine.IO packet.
///
/// # Errors
///
/// Returns a [`PacketError`] describing why the frame was rejected. The
/// decoder never panics on arbitrary input.
pub fn decode(frame: &str) -> Result<EnginePacket, PacketError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();
    let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());
    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(optional(rest))),
        '3' => Ok(EnginePacket::Pong(optional(rest))),
        '4' => Ok(EnginePacket::Message(decode_socket(rest)?)),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        found => Err(PacketError::UnknownType {
            layer: "engine",
            found,
        }),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, PacketError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let mut rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(PacketError::Unsupported("binary socket packet"));
    }
    if !matches!(kind, '0'..='4') {
        return Err(PacketError::UnknownType {
            layer: "socket",
            found: kind,
        });
    }

    let mut namespace = DEFAULT_NAMESPACE.to_string();
    if rest.starts_with('/') {
        let (ns, tail) = rest.split_once(',').unwrap_or((rest, ""));
        namespace = ns.to_string();
        rest = tail;
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        Some(
            rest[..digits]
                .parse::<u64>()
                .map_err(|e| PacketError::Malformed(format!("ack id: {e}")))?,
        )
    } else {
        None
    };
    rest = &rest[digits..];

    match kind {
        '0' => Ok(SocketPacket::Connect {
            namespace,
            data: if rest.is_empty() {
                None
            } else {
                Some(serde_json::from_str(rest)?)
            },
        }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let args: Vec<Value> = serde_json::from_str(rest)?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                Some(other) => {
                    return Err(PacketError::Malformed(format!(
                        "event name must be a string, got {other}"
                    )));
                }
                None => return Err(PacketError::Malformed("event without a name".into())),
            };
            Ok(SocketPacket::Event {
                namespace,
                name,
                payload: args.next().unwrap_or(Value::Null),
                ack_id,
            })
        }
        '3' => Ok(SocketPacket::Ack {
            namespace,
            ack_id: ack_id.ok_or_else(|| PacketError::Malformed("ack without id".into()))?,
            args: serde_json::from_str(rest)?,
        }),
        _ => {
            let message = if rest.is_empty() {
                "connection refused".to_string()
            } else {
                match serde_json::from_str::<Value>(rest)? {
                    Value::Object(map) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("connection refused")
                        .to_string(),
                    Value::String(s) => s,
                    other => other.to_string(),
                }
            };
            Ok(SocketPacket::ConnectError { namespace, message })
        }
    }
}
