//! Connection-side state shared by the server and the registry

pub mod context;
pub mod handle;

pub use context::SessionContext;
pub use handle::{ConnectionHandle, ConnectionId, Outbound, SendError};
