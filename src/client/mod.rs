//! Relay client
//!
//! Provides the producer side of the relay:
//! - Registering a stream and receiving its id
//! - Keeping the connection alive while a command runs
//! - Forwarding the command's output lines to subscribers

pub mod config;
pub mod session;
pub mod source;

pub use config::ClientConfig;
pub use session::{FrameSender, SessionSummary, StreamingSession};
pub use source::{LineReader, LineSource};
