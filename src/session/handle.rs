//! Connection handles
//!
//! A [`ConnectionHandle`] is what the registry keeps for each connection: a
//! bounded queue of outbound frames plus a close signal. The connection task
//! owns the websocket and drains both.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::ServerFrame;

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The outbound queue is full (slow peer)
    #[error("outbound queue full")]
    Full,
    /// The connection is closed or closing
    #[error("connection closed")]
    Closed,
}

/// Cloneable handle to a live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerFrame>,
    close: CancellationToken,
}

/// Receiving side of a [`ConnectionHandle`], owned by the connection task
#[derive(Debug)]
pub struct Outbound {
    pub frames: mpsc::Receiver<ServerFrame>,
    pub close: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiving side for the connection task
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, Outbound) {
        let (tx, frames) = mpsc::channel(capacity.max(1));
        let close = CancellationToken::new();

        let handle = Self {
            id,
            tx,
            close: close.clone(),
        };

        (handle, Outbound { frames, close })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting
    pub fn send(&self, frame: ServerFrame) -> Result<(), SendError> {
        if self.close.is_cancelled() {
            return Err(SendError::Closed);
        }

        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the connection task to close. Frames queued before this call are
    /// still delivered. Calling it again is a no-op.
    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled() || self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_close() {
        let (handle, mut outbound) = ConnectionHandle::new(ConnectionId(1), 4);

        handle.send(ServerFrame::pong()).unwrap();
        handle.close();
        handle.close();

        assert!(handle.is_closed());
        assert!(outbound.close.is_cancelled());
        assert_eq!(handle.send(ServerFrame::pong()), Err(SendError::Closed));

        // Queued frame survives the close
        assert_eq!(outbound.frames.recv().await, Some(ServerFrame::pong()));
    }

    #[test]
    fn test_full_queue() {
        let (handle, _outbound) = ConnectionHandle::new(ConnectionId(2), 1);

        handle.send(ServerFrame::payload("a")).unwrap();
        assert_eq!(handle.send(ServerFrame::payload("b")), Err(SendError::Full));
    }

    #[test]
    fn test_receiver_dropped() {
        let (handle, outbound) = ConnectionHandle::new(ConnectionId(3), 1);
        drop(outbound);

        assert!(handle.is_closed());
        assert_eq!(handle.send(ServerFrame::pong()), Err(SendError::Closed));
    }

    #[test]
    fn test_send_error_display() {
        assert_eq!(SendError::Full.to_string(), "outbound queue full");
        assert_eq!(SendError::Closed.to_string(), "connection closed");
    }
}
