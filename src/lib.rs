//! # shout-rs
//!
//! Pipe a command's output to any number of websocket viewers in real time.
//!
//! A producer connects, sends `{initialize}` and gets a short stream id back.
//! Viewers connect and `{subscribe}` to that id. Every `{payload}` the
//! producer sends is copied verbatim to the current subscribers. Connections
//! that go quiet for longer than the sweep interval are evicted, and a
//! producer's departure closes its viewers.
//!
//! ## Server
//!
//! ```no_run
//! use shout_rs::{RelayServer, ServerConfig};
//!
//! # async fn example() -> shout_rs::error::Result<()> {
//! let server = RelayServer::new(ServerConfig::default());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Producer
//!
//! ```no_run
//! use shout_rs::client::{ClientConfig, StreamingSession};
//!
//! # async fn example() -> shout_rs::error::Result<()> {
//! let command = vec!["ls".to_string(), "-la".to_string()];
//! let session = StreamingSession::connect(ClientConfig::default(), Some(command.join(" "))).await?;
//! println!("Page: {}", session.viewer_url());
//! session.run(&command).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use error::{Error, Result};
pub use registry::{StreamId, StreamRegistry};
pub use server::{RelayServer, ServerConfig};
