//! Liveness records
//!
//! One record per connection that has sent at least one frame. The sweep
//! evicts any record whose `last_activity` is older than the sweep interval.

use std::time::Duration;

use tokio::time::Instant;

use super::key::StreamId;
use crate::session::ConnectionHandle;

/// Role a connection has taken on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Connected, no `initialize` or `subscribe` yet
    Unregistered,
    /// Registered the given stream
    Producer(StreamId),
    /// Subscribed to the given stream
    Subscriber(StreamId),
}

impl Role {
    pub fn is_registered(&self) -> bool {
        !matches!(self, Role::Unregistered)
    }
}

/// Liveness state for one connection
#[derive(Debug, Clone)]
pub struct LivenessRecord {
    /// Handle used to close the connection on eviction
    pub(super) handle: ConnectionHandle,
    /// Last `initialize`, `subscribe` or `ping`
    pub last_activity: Instant,
    pub role: Role,
}

impl LivenessRecord {
    pub(super) fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            last_activity: Instant::now(),
            role: Role::Unregistered,
        }
    }

    pub(super) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the connection has been silent for longer than `limit` at `now`
    pub fn is_stale(&self, now: Instant, limit: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > limit
    }
}
