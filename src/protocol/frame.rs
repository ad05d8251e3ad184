//! Wire frames
//!
//! Every frame is one JSON object carried in a websocket text message.
//! Inbound frames are recognised by which key is present (and truthy), in the
//! order `initialize`, `subscribe`, `ping`, `payload`. An object carrying none
//! of them is treated as a payload frame without data.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ProtocolError, RoutingError};
use crate::registry::StreamId;

/// Frame sent by a client (producer or subscriber)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Register this connection as a producer
    Initialize { source_command: Option<String> },
    /// Join an existing stream
    Subscribe { stream_id: StreamId },
    /// Keep-alive
    Ping,
    /// One chunk of producer output. `None` when the frame carried no usable
    /// data.
    Payload { data: Option<String> },
}

impl ClientFrame {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        Ok(Self::from_object(obj))
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        if obj.get("initialize").is_some_and(truthy) {
            let source_command = obj
                .get("source_command")
                .and_then(Value::as_str)
                .map(str::to_owned);
            return ClientFrame::Initialize { source_command };
        }

        if let Some(id) = obj.get("subscribe").and_then(Value::as_str) {
            if !id.is_empty() {
                return ClientFrame::Subscribe {
                    stream_id: StreamId::new(id),
                };
            }
        }

        if obj.get("ping").is_some_and(truthy) {
            return ClientFrame::Ping;
        }

        let data = obj
            .get("payload")
            .and_then(Value::as_str)
            .map(str::to_owned);
        ClientFrame::Payload { data }
    }

    /// Encode for sending
    pub fn to_json(&self) -> String {
        let value = match self {
            ClientFrame::Initialize { source_command } => match source_command {
                Some(cmd) => json!({ "initialize": true, "source_command": cmd }),
                None => json!({ "initialize": true }),
            },
            ClientFrame::Subscribe { stream_id } => json!({ "subscribe": stream_id }),
            ClientFrame::Ping => json!({ "ping": "ping" }),
            ClientFrame::Payload { data } => json!({ "payload": data }),
        };
        value.to_string()
    }
}

/// JSON truthiness: `false`, `null`, `0`, `""`, `[]` and `{}` are falsy
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Body of an error frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub short: String,
    pub msg: String,
}

impl From<&RoutingError> for ErrorBody {
    fn from(err: &RoutingError) -> Self {
        Self {
            short: err.short().to_owned(),
            msg: err.to_string(),
        }
    }
}

/// Frame sent by the server
///
/// Variant order matters for decoding: serde tries them top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Reply to `initialize`
    StreamId { stream_id: StreamId },
    /// Reply to a successful `subscribe`
    Subscribed {
        subscribe: String,
        source_command: Option<String>,
    },
    /// Reply to `ping`
    Pong { pong: String },
    /// Fan-out copy of a producer payload
    Payload { payload: String },
    Error { error: ErrorBody },
}

impl ServerFrame {
    pub fn stream_id(id: StreamId) -> Self {
        ServerFrame::StreamId { stream_id: id }
    }

    pub fn subscribed(source_command: Option<String>) -> Self {
        ServerFrame::Subscribed {
            subscribe: "ok".to_owned(),
            source_command,
        }
    }

    pub fn pong() -> Self {
        ServerFrame::Pong {
            pong: "pong".to_owned(),
        }
    }

    pub fn payload(data: impl Into<String>) -> Self {
        ServerFrame::Payload {
            payload: data.into(),
        }
    }

    pub fn error(err: &RoutingError) -> Self {
        ServerFrame::Error { error: err.into() }
    }

    /// Encode for sending
    pub fn to_json(&self) -> String {
        // Every variant is a plain object of strings; encoding cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a frame received from the server
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_initialize() {
        let frame = ClientFrame::parse(r#"{"initialize": true, "source_command": "echo hi"}"#)
            .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Initialize {
                source_command: Some("echo hi".into())
            }
        );

        let frame = ClientFrame::parse(r#"{"initialize": true}"#).unwrap();
        assert_eq!(frame, ClientFrame::Initialize { source_command: None });
    }

    #[test]
    fn test_parse_subscribe_and_ping() {
        assert_eq!(
            ClientFrame::parse(r#"{"subscribe": "ab3q"}"#).unwrap(),
            ClientFrame::Subscribe {
                stream_id: StreamId::new("ab3q")
            }
        );
        assert_eq!(
            ClientFrame::parse(r#"{"ping": "ping"}"#).unwrap(),
            ClientFrame::Ping
        );
    }

    #[test]
    fn test_key_precedence() {
        // initialize wins over everything else
        let frame = ClientFrame::parse(r#"{"payload": "x", "ping": "ping", "initialize": 1}"#)
            .unwrap();
        assert!(matches!(frame, ClientFrame::Initialize { .. }));

        // falsy initialize falls through to subscribe
        let frame = ClientFrame::parse(r#"{"initialize": false, "subscribe": "ab3q"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Subscribe { .. }));

        // empty subscribe falls through to ping
        let frame = ClientFrame::parse(r#"{"subscribe": "", "ping": true}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping);
    }

    #[test]
    fn test_payload_without_data() {
        assert_eq!(
            ClientFrame::parse(r#"{"payload": null}"#).unwrap(),
            ClientFrame::Payload { data: None }
        );
        assert_eq!(
            ClientFrame::parse(r#"{"payload": 12}"#).unwrap(),
            ClientFrame::Payload { data: None }
        );
        assert_eq!(
            ClientFrame::parse(r#"{"something": "else"}"#).unwrap(),
            ClientFrame::Payload { data: None }
        );
        // An empty string is still data
        assert_eq!(
            ClientFrame::parse(r#"{"payload": ""}"#).unwrap(),
            ClientFrame::Payload {
                data: Some(String::new())
            }
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            ClientFrame::parse("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            ClientFrame::parse("[1, 2]"),
            Err(ProtocolError::NotAnObject)
        ));
    }

    #[test]
    fn test_server_frame_encoding() {
        assert_eq!(
            ServerFrame::stream_id(StreamId::new("ab3q")).to_json(),
            r#"{"stream_id":"ab3q"}"#
        );
        assert_eq!(
            ServerFrame::subscribed(Some("echo hi".into())).to_json(),
            r#"{"subscribe":"ok","source_command":"echo hi"}"#
        );
        assert_eq!(ServerFrame::pong().to_json(), r#"{"pong":"pong"}"#);
        assert_eq!(ServerFrame::payload("hi\n").to_json(), r#"{"payload":"hi\n"}"#);

        let err = ServerFrame::error(&RoutingError::NoData).to_json();
        let value: Value = serde_json::from_str(&err).unwrap();
        assert_eq!(value["error"]["short"], "NODATA");
        assert_eq!(value["error"]["msg"], "Expected `payload` key with data");
    }

    #[test]
    fn test_server_frame_decoding() {
        assert_eq!(
            ServerFrame::parse(r#"{"pong":"pong"}"#).unwrap(),
            ServerFrame::pong()
        );
        assert_eq!(
            ServerFrame::parse(r#"{"subscribe":"ok","source_command":null}"#).unwrap(),
            ServerFrame::subscribed(None)
        );
        assert_eq!(
            ServerFrame::parse(r#"{"error":{"short":"NOSTREAM","msg":"gone"}}"#).unwrap(),
            ServerFrame::Error {
                error: ErrorBody {
                    short: "NOSTREAM".into(),
                    msg: "gone".into()
                }
            }
        );
    }

    #[test]
    fn test_client_frame_encoding() {
        let json = ClientFrame::Initialize {
            source_command: Some("ls -la".into()),
        }
        .to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["initialize"], true);
        assert_eq!(value["source_command"], "ls -la");

        assert_eq!(ClientFrame::Ping.to_json(), r#"{"ping":"ping"}"#);
    }
}
