//! Per-connection context
//!
//! Read-only facts about a connection, carried by the connection task for
//! logging and passed to the router.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::handle::ConnectionId;

/// Context for one websocket connection
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique connection ID
    pub connection_id: ConnectionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// When the socket was accepted
    pub connected_at: Instant,
}

impl SessionContext {
    /// Create a new context
    pub fn new(connection_id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            connection_id,
            peer_addr,
            connected_at: Instant::now(),
        }
    }

    /// Time since the socket was accepted
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
