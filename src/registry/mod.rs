//! Stream registry for pub/sub routing
//!
//! The registry owns every live stream and routes producer payloads to
//! subscribers. It also keeps the per-connection liveness records that the
//! sweep uses to evict silent connections.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌──────────────────────────────┐
//!                     │ streams:     StreamId -> {    │
//!                     │   source_command,             │
//!                     │   subscribers: Id -> Handle,  │
//!                     │ }                             │
//!                     │ producers:   Id -> StreamId   │
//!                     │ connections: Id -> Liveness   │
//!                     └──────────────┬───────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!     [Producer]               [Subscriber]               [Subscriber]
//!   {payload: line}          handle.send() queue        handle.send() queue
//!         │                          │                          │
//!         └──► registry.broadcast() ─┴──► connection task ──► websocket
//! ```
//!
//! Fan-out never awaits: frames go into each subscriber's bounded queue with
//! `try_send`, so one slow viewer cannot stall the producer or its siblings.

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod liveness;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{Delivery, StreamEntry, StreamStats};
pub use error::RegistryError;
pub use key::StreamId;
pub use liveness::{LivenessRecord, Role};
pub use store::{CleanupOutcome, StreamRegistry};
