//! Relay server
//!
//! Accepts websocket connections, routes their frames through the shared
//! [`StreamRegistry`](crate::registry::StreamRegistry), and runs the liveness
//! sweep in the background.

pub mod config;
pub mod connection;
pub mod listener;
pub mod router;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::RelayServer;
pub use router::{Disposition, MessageRouter};
