//! Error types
//!
//! Three families matter on the wire:
//! - [`ProtocolError`]: the peer sent something that is not a frame. The
//!   connection is closed without an error frame.
//! - [`RoutingError`]: a well-formed frame that cannot be routed. An
//!   `{error: {short, msg}}` frame is sent before closing.
//! - Transport failures (`WebSocket`, `Io`): terminal for that session only.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// The server answered the handshake with an error frame
    #[error("Server rejected the session ({short}): {msg}")]
    Rejected { short: String, msg: String },

    /// The handshake did not produce a stream id
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A frame could not be written in time
    #[error("Send timed out")]
    SendTimeout,

    /// The connection closed while the session still needed it
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("No command given to run")]
    EmptyCommand,
}

/// Malformed or unsupported inbound frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("binary frames are not supported")]
    BinaryFrame,
}

/// Well-formed frame that cannot be routed
///
/// Each variant maps to the short code sent in the error frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("That stream doesn't exist: {0}")]
    NoStream(String),

    #[error("You have not registered as a stream")]
    NotRegistered,

    #[error("Expected `payload` key with data")]
    NoData,

    #[error("This connection is already registered")]
    AlreadyRegistered,
}

impl RoutingError {
    /// Short code carried in `{error: {short}}`
    pub fn short(&self) -> &'static str {
        match self {
            RoutingError::NoStream(_) => "NOSTREAM",
            RoutingError::NotRegistered => "NOTREGISTERED",
            RoutingError::NoData => "NODATA",
            RoutingError::AlreadyRegistered => "ALREADYREGISTERED",
        }
    }
}

impl From<RegistryError> for RoutingError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::StreamNotFound(id) => RoutingError::NoStream(id.to_string()),
            RegistryError::NotProducer => RoutingError::NotRegistered,
            RegistryError::AlreadyRegistered => RoutingError::AlreadyRegistered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamId;

    #[test]
    fn test_short_codes() {
        assert_eq!(RoutingError::NoStream("ab3q".into()).short(), "NOSTREAM");
        assert_eq!(RoutingError::NotRegistered.short(), "NOTREGISTERED");
        assert_eq!(RoutingError::NoData.short(), "NODATA");
        assert_eq!(RoutingError::AlreadyRegistered.short(), "ALREADYREGISTERED");
    }

    #[test]
    fn test_registry_error_mapping() {
        let err: RoutingError = RegistryError::StreamNotFound(StreamId::new("zz99")).into();
        assert_eq!(err, RoutingError::NoStream("zz99".into()));
        assert_eq!(err.to_string(), "That stream doesn't exist: zz99");

        let err: RoutingError = RegistryError::NotProducer.into();
        assert_eq!(err, RoutingError::NotRegistered);
    }
}
