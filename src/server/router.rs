//! Message router
//!
//! Turns inbound frames into registry operations and queues the replies on
//! the sender's own connection handle.

use std::sync::Arc;

use crate::error::{ProtocolError, RoutingError};
use crate::protocol::{ClientFrame, ServerFrame};
use crate::registry::StreamRegistry;
use crate::session::ConnectionHandle;

/// What the connection task should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep reading
    Continue,
    /// The connection has been asked to close
    Close,
}

/// Dispatches client frames for every connection
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<StreamRegistry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Handle one text frame
    pub async fn handle_text(&self, conn: &ConnectionHandle, text: &str) -> Disposition {
        match ClientFrame::parse(text) {
            Ok(frame) => self.dispatch(conn, frame).await,
            Err(e) => self.protocol_error(conn, e),
        }
    }

    /// Close the connection for a frame that could not be parsed
    pub fn protocol_error(&self, conn: &ConnectionHandle, err: ProtocolError) -> Disposition {
        tracing::warn!(connection_id = %conn.id(), error = %err, "Protocol error, closing");
        conn.close();
        Disposition::Close
    }

    /// Handle one parsed frame
    pub async fn dispatch(&self, conn: &ConnectionHandle, frame: ClientFrame) -> Disposition {
        let result = match frame {
            ClientFrame::Initialize { source_command } => self
                .registry
                .initialize(conn, source_command)
                .await
                .map(|id| Some(ServerFrame::stream_id(id)))
                .map_err(RoutingError::from),

            ClientFrame::Subscribe { stream_id } => self
                .registry
                .subscribe(conn, &stream_id)
                .await
                .map(|cmd| Some(ServerFrame::subscribed(cmd)))
                .map_err(RoutingError::from),

            ClientFrame::Ping => {
                self.registry.ping(conn).await;
                Ok(Some(ServerFrame::pong()))
            }

            ClientFrame::Payload { data } => self.payload(conn, data).await,
        };

        match result {
            Ok(reply) => {
                if let Some(reply) = reply {
                    self.reply(conn, reply);
                }
                Disposition::Continue
            }
            Err(err) => self.routing_error(conn, err),
        }
    }

    async fn payload(
        &self,
        conn: &ConnectionHandle,
        data: Option<String>,
    ) -> Result<Option<ServerFrame>, RoutingError> {
        match data {
            Some(data) => {
                self.registry.broadcast(conn, &data).await?;
                Ok(None)
            }
            None => {
                // Unregistered takes precedence over missing data
                self.registry.track(conn).await;
                if self.registry.stream_of(conn.id()).await.is_none() {
                    Err(RoutingError::NotRegistered)
                } else {
                    Err(RoutingError::NoData)
                }
            }
        }
    }

    /// Send an error frame, then close
    fn routing_error(&self, conn: &ConnectionHandle, err: RoutingError) -> Disposition {
        tracing::info!(
            connection_id = %conn.id(),
            code = err.short(),
            error = %err,
            "Routing error, closing"
        );
        self.reply(conn, ServerFrame::error(&err));
        conn.close();
        Disposition::Close
    }

    fn reply(&self, conn: &ConnectionHandle, frame: ServerFrame) {
        if let Err(e) = conn.send(frame) {
            tracing::debug!(connection_id = %conn.id(), error = %e, "Reply not queued");
        }
    }
}
