//! Stream registry implementation
//!
//! The central registry that owns every live stream, the producer reverse
//! map, and the liveness records. All mutations take the write lock and
//! finish without awaiting, so they are atomic with respect to each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};

use super::config::RegistryConfig;
use super::entry::{Delivery, StreamEntry, StreamStats};
use super::error::RegistryError;
use super::key::{self, StreamId};
use super::liveness::{LivenessRecord, Role};
use crate::session::{ConnectionHandle, ConnectionId};

/// What a cleanup call removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The connection was not tracked (never sent a frame, or already
    /// cleaned up)
    NotTracked,
    /// An unregistered connection was forgotten
    Unregistered,
    /// A producer's stream was removed and its subscribers closed
    Producer {
        stream_id: StreamId,
        closed_subscribers: usize,
    },
    /// A subscriber was detached from its stream
    Subscriber { stream_id: StreamId },
}

struct RegistryState {
    streams: HashMap<StreamId, StreamEntry>,
    producers: HashMap<ConnectionId, StreamId>,
    connections: HashMap<ConnectionId, LivenessRecord>,
    /// Id source, drawn from only under the write lock
    rng: StdRng,
}

impl RegistryState {
    fn new(rng: StdRng) -> Self {
        Self {
            streams: HashMap::new(),
            producers: HashMap::new(),
            connections: HashMap::new(),
            rng,
        }
    }

    fn record_mut(&mut self, handle: &ConnectionHandle) -> &mut LivenessRecord {
        self.connections
            .entry(handle.id())
            .or_insert_with(|| LivenessRecord::new(handle.clone()))
    }

    fn remove_connection(&mut self, id: ConnectionId) -> CleanupOutcome {
        let Some(record) = self.connections.remove(&id) else {
            return CleanupOutcome::NotTracked;
        };

        match record.role {
            Role::Unregistered => CleanupOutcome::Unregistered,
            Role::Producer(stream_id) => {
                self.producers.remove(&id);

                let closed = match self.streams.remove(&stream_id) {
                    Some(mut entry) => {
                        let closed = entry.close_subscribers();
                        for sub in &closed {
                            self.connections.remove(sub);
                        }
                        closed.len()
                    }
                    None => 0,
                };

                CleanupOutcome::Producer {
                    stream_id,
                    closed_subscribers: closed,
                }
            }
            Role::Subscriber(stream_id) => {
                if let Some(entry) = self.streams.get_mut(&stream_id) {
                    entry.subscribers.remove(&id);
                }
                CleanupOutcome::Subscriber { stream_id }
            }
        }
    }
}

/// Clears the sweep flag when a sweep finishes or its task is aborted
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Central registry for all live streams
///
/// Thread-safe via `RwLock`. Queries take the read lock; every mutation takes
/// the write lock for its whole duration.
pub struct StreamRegistry {
    state: RwLock<RegistryState>,

    /// Set while a sweep is running
    sweeping: AtomicBool,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a registry whose ids come from `rng`
    pub fn with_rng(config: RegistryConfig, rng: StdRng) -> Self {
        Self {
            state: RwLock::new(RegistryState::new(rng)),
            sweeping: AtomicBool::new(false),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register `conn` as the producer of a new stream
    ///
    /// The id is allocated and inserted under one write lock, so two
    /// concurrent calls never receive the same id.
    pub async fn initialize(
        &self,
        conn: &ConnectionHandle,
        source_command: Option<String>,
    ) -> Result<StreamId, RegistryError> {
        let mut state = self.state.write().await;

        if state.record_mut(conn).role.is_registered() {
            return Err(RegistryError::AlreadyRegistered);
        }

        let stream_id = {
            let RegistryState { streams, rng, .. } = &mut *state;
            key::allocate(rng, self.config.max_key_length, |k| streams.contains_key(k))
        };

        state.streams.insert(
            stream_id.clone(),
            StreamEntry::new(conn.id(), source_command.clone()),
        );
        state.producers.insert(conn.id(), stream_id.clone());

        let record = state.record_mut(conn);
        record.role = Role::Producer(stream_id.clone());
        record.touch();

        tracing::info!(
            stream = %stream_id,
            connection_id = %conn.id(),
            source_command = ?source_command,
            "Initialized stream"
        );

        Ok(stream_id)
    }

    /// Add `conn` to the subscribers of `stream_id`
    ///
    /// Returns the stream's source command. Fails with `StreamNotFound` if the
    /// stream does not exist, including when its producer's cleanup has
    /// already run.
    pub async fn subscribe(
        &self,
        conn: &ConnectionHandle,
        stream_id: &StreamId,
    ) -> Result<Option<String>, RegistryError> {
        let mut state = self.state.write().await;

        if state.record_mut(conn).role.is_registered() {
            return Err(RegistryError::AlreadyRegistered);
        }

        let Some(entry) = state.streams.get_mut(stream_id) else {
            tracing::info!(
                stream = %stream_id,
                connection_id = %conn.id(),
                "Attempt to subscribe to non-existent stream"
            );
            return Err(RegistryError::StreamNotFound(stream_id.clone()));
        };

        entry.subscribers.insert(conn.id(), conn.clone());
        let source_command = entry.source_command.clone();
        let subscribers = entry.subscriber_count();

        let record = state.record_mut(conn);
        record.role = Role::Subscriber(stream_id.clone());
        record.touch();

        tracing::info!(
            stream = %stream_id,
            connection_id = %conn.id(),
            subscribers = subscribers,
            "Subscriber added"
        );

        Ok(source_command)
    }

    /// Refresh the liveness timestamp of `conn`
    pub async fn ping(&self, conn: &ConnectionHandle) {
        let mut state = self.state.write().await;
        state.record_mut(conn).touch();
    }

    /// Start tracking `conn` without refreshing it
    ///
    /// Called for frames that do not count as activity (payloads).
    pub async fn track(&self, conn: &ConnectionHandle) {
        let mut state = self.state.write().await;
        state.record_mut(conn);
    }

    /// Fan `data` out to every subscriber of the stream `conn` produces
    pub async fn broadcast(
        &self,
        conn: &ConnectionHandle,
        data: &str,
    ) -> Result<Delivery, RegistryError> {
        let mut state = self.state.write().await;
        state.record_mut(conn);

        let stream_id = state
            .producers
            .get(&conn.id())
            .cloned()
            .ok_or(RegistryError::NotProducer)?;

        let entry = state
            .streams
            .get_mut(&stream_id)
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.clone()))?;

        let delivery = entry.fan_out(data);

        tracing::debug!(
            stream = %stream_id,
            bytes = data.len(),
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Payload relayed"
        );

        Ok(delivery)
    }

    /// Tear down everything owned by a terminating connection
    ///
    /// A producer's subscribers are closed and its stream removed; a
    /// subscriber is detached from its stream. Calling this again for the
    /// same connection returns `NotTracked`.
    pub async fn cleanup(&self, id: ConnectionId) -> CleanupOutcome {
        let outcome = self.state.write().await.remove_connection(id);
        log_cleanup(id, &outcome);
        outcome
    }

    /// Evict every connection silent for longer than the sweep interval at
    /// `now`. Evicted connections are closed and cleaned up.
    ///
    /// Returns the number of connections no longer tracked afterwards
    /// (subscribers taken down with an evicted producer included), or `None`
    /// if another sweep was already running.
    pub async fn sweep_at(&self, now: Instant) -> Option<usize> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sweep already running, skipping");
            return None;
        }
        let _running = SweepGuard(&self.sweeping);

        let limit = self.config.sweep_interval;
        let evicted = {
            let mut state = self.state.write().await;

            let stale: Vec<ConnectionId> = state
                .connections
                .iter()
                .filter(|(_, record)| record.is_stale(now, limit))
                .map(|(id, _)| *id)
                .collect();

            let before = state.connections.len();
            for id in stale {
                // A producer evicted earlier in this pass may already have
                // taken this subscriber with it
                if let Some(record) = state.connections.get(&id) {
                    record.handle.close();
                }
                let outcome = state.remove_connection(id);
                log_cleanup(id, &outcome);
            }
            before - state.connections.len()
        };

        tracing::info!(evicted = evicted, "Liveness sweep finished");
        Some(evicted)
    }

    /// Run one sweep against the current time
    pub async fn sweep(&self) -> Option<usize> {
        self.sweep_at(Instant::now()).await
    }

    /// Spawn the recurring liveness sweep
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.sweep().await;
            }
        })
    }

    /// Check if a stream exists
    pub async fn stream_exists(&self, id: &StreamId) -> bool {
        self.state.read().await.streams.contains_key(id)
    }

    /// Get stream statistics
    pub async fn stream_stats(&self, id: &StreamId) -> Option<StreamStats> {
        self.state.read().await.streams.get(id).map(StreamEntry::stats)
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.state.read().await.streams.len()
    }

    /// Get number of tracked connections
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Role of a tracked connection
    pub async fn role_of(&self, id: ConnectionId) -> Option<Role> {
        self.state
            .read()
            .await
            .connections
            .get(&id)
            .map(|record| record.role.clone())
    }

    /// Stream produced by a connection
    pub async fn stream_of(&self, id: ConnectionId) -> Option<StreamId> {
        self.state.read().await.producers.get(&id).cloned()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn log_cleanup(id: ConnectionId, outcome: &CleanupOutcome) {
    match outcome {
        CleanupOutcome::NotTracked => {
            tracing::debug!(connection_id = %id, "Cleanup skipped, connection not tracked");
        }
        CleanupOutcome::Unregistered => {
            tracing::debug!(connection_id = %id, "Cleaned up unregistered connection");
        }
        CleanupOutcome::Producer {
            stream_id,
            closed_subscribers,
        } => {
            tracing::info!(
                stream = %stream_id,
                connection_id = %id,
                closed_subscribers = closed_subscribers,
                "Cleaned up stream"
            );
        }
        CleanupOutcome::Subscriber { stream_id } => {
            tracing::debug!(stream = %stream_id, connection_id = %id, "Subscriber removed");
        }
    }
}
