//! Registry error types
//!
//! Error types for stream registry operations.

use thiserror::Error;

use super::key::StreamId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Stream not found (never existed or already cleaned up)
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// The connection is not the producer of any stream
    #[error("Connection is not a producer")]
    NotProducer,

    /// The connection already holds a role
    #[error("Connection is already registered")]
    AlreadyRegistered,
}
