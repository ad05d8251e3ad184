//! Stream entry and stats types
//!
//! This module defines the per-stream state stored in the registry.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::ServerFrame;
use crate::session::{ConnectionHandle, ConnectionId};

/// Entry for a single stream in the registry
#[derive(Debug)]
pub struct StreamEntry {
    /// Connection that registered the stream
    pub producer: ConnectionId,

    /// Command line the producer reported, shown to viewers
    pub source_command: Option<String>,

    /// Current subscribers
    pub(super) subscribers: HashMap<ConnectionId, ConnectionHandle>,

    /// Payloads fanned out so far
    pub payloads_relayed: u64,

    /// When the stream was created
    pub created_at: Instant,
}

/// Result of fanning one payload out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers the frame was queued for
    pub delivered: usize,
    /// Subscribers whose queue rejected the frame
    pub failed: usize,
}

impl StreamEntry {
    pub(super) fn new(producer: ConnectionId, source_command: Option<String>) -> Self {
        Self {
            producer,
            source_command,
            subscribers: HashMap::new(),
            payloads_relayed: 0,
            created_at: Instant::now(),
        }
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Queue `{payload}` for every subscriber
    ///
    /// A failed subscriber is logged and skipped; the rest still receive the
    /// frame.
    pub(super) fn fan_out(&mut self, data: &str) -> Delivery {
        let frame = ServerFrame::payload(data);
        let mut delivery = Delivery::default();

        for (id, sub) in &self.subscribers {
            match sub.send(frame.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        subscriber = %id,
                        producer = %self.producer,
                        error = %e,
                        "Dropped payload for subscriber"
                    );
                }
            }
        }

        self.payloads_relayed += 1;
        delivery
    }

    /// Close every subscriber and return their ids
    pub(super) fn close_subscribers(&mut self) -> Vec<ConnectionId> {
        self.subscribers
            .drain()
            .map(|(id, sub)| {
                sub.close();
                id
            })
            .collect()
    }

    pub(super) fn stats(&self) -> StreamStats {
        StreamStats {
            subscriber_count: self.subscriber_count(),
            source_command: self.source_command.clone(),
            payloads_relayed: self.payloads_relayed,
            age: self.created_at.elapsed(),
        }
    }
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of current subscribers
    pub subscriber_count: usize,
    /// Command line reported by the producer
    pub source_command: Option<String>,
    /// Payloads fanned out so far
    pub payloads_relayed: u64,
    /// Time since the stream was created
    pub age: Duration,
}
