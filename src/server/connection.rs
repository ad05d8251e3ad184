//! Per-connection task
//!
//! Owns one websocket. Inbound text frames go to the router; frames queued on
//! the connection's handle (replies and fan-out copies) go out in queue
//! order. When the handle is closed, anything already queued is flushed
//! before the close frame.
//!
//! Every write is bounded by the configured write timeout, and the final
//! flush-then-close shares one deadline. A peer that stops reading is dropped
//! instead of pinning the task.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{ProtocolError, Result};
use crate::protocol::ServerFrame;
use crate::registry::StreamRegistry;
use crate::session::{ConnectionHandle, Outbound, SessionContext};

use super::config::ServerConfig;
use super::router::{Disposition, MessageRouter};

/// A single relay connection
pub struct Connection {
    ctx: SessionContext,
    ws: WebSocketStream<TcpStream>,
    handle: ConnectionHandle,
    outbound: Outbound,
    router: MessageRouter,
    write_timeout: Duration,
}

impl Connection {
    /// Upgrade `socket` to a websocket within the configured timeout
    pub async fn accept(
        ctx: SessionContext,
        socket: TcpStream,
        config: &ServerConfig,
        router: MessageRouter,
    ) -> Result<Self> {
        let ws = tokio::time::timeout(
            config.connection_timeout,
            tokio_tungstenite::accept_async(socket),
        )
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "websocket upgrade timed out"))??;

        let (handle, outbound) =
            ConnectionHandle::new(ctx.connection_id, config.outbound_queue_capacity);

        Ok(Self {
            ctx,
            ws,
            handle,
            outbound,
            router,
            write_timeout: config.write_timeout,
        })
    }

    /// Run until either side closes, then tear down registry state
    pub async fn run(mut self) -> Result<()> {
        let result = self.pump().await;

        // Whatever ended the loop, nothing may keep routing to this handle
        self.handle.close();
        self.registry().cleanup(self.ctx.connection_id).await;

        tracing::debug!(
            connection_id = %self.ctx.connection_id,
            peer = %self.ctx.peer_addr,
            duration_ms = self.ctx.duration().as_millis() as u64,
            "Connection finished"
        );

        result
    }

    fn registry(&self) -> &Arc<StreamRegistry> {
        self.router.registry()
    }

    async fn pump(&mut self) -> Result<()> {
        let close = self.outbound.close.clone();

        loop {
            tokio::select! {
                biased;

                Some(frame) = self.outbound.frames.recv() => {
                    // Closing must not wait behind a write the peer is not reading
                    let written = tokio::select! {
                        biased;
                        result = self.write(frame) => Some(result),
                        _ = close.cancelled() => None,
                    };
                    match written {
                        Some(result) => result?,
                        None => return self.finish().await,
                    }
                }

                _ = close.cancelled() => return self.finish().await,

                msg = self.ws.next() => {
                    let disposition = match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.router.handle_text(&self.handle, &text).await
                        }
                        Some(Ok(Message::Binary(_))) => {
                            self.router.protocol_error(&self.handle, ProtocolError::BinaryFrame)
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!(connection_id = %self.ctx.connection_id, "Peer closed");
                            return Ok(());
                        }
                        // Control frames are answered by tungstenite
                        Some(Ok(_)) => Disposition::Continue,
                        Some(Err(e)) => return Err(e.into()),
                    };

                    if disposition == Disposition::Close {
                        return self.finish().await;
                    }
                }
            }
        }
    }

    async fn write(&mut self, frame: ServerFrame) -> Result<()> {
        tokio::time::timeout(self.write_timeout, self.ws.send(Message::Text(frame.to_json())))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "websocket write timed out"))??;
        Ok(())
    }

    /// Flush what is already queued, then send the close frame, all within
    /// one write timeout
    async fn finish(&mut self) -> Result<()> {
        let ws = &mut self.ws;
        let frames = &mut self.outbound.frames;

        let flushed = tokio::time::timeout(self.write_timeout, async {
            while let Ok(frame) = frames.try_recv() {
                ws.feed(Message::Text(frame.to_json())).await?;
            }
            ws.close(None).await
        })
        .await;

        match flushed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.ctx.connection_id, error = %e, "Close handshake failed");
            }
            Err(_) => {
                tracing::warn!(connection_id = %self.ctx.connection_id, "Peer not reading, dropped without flushing");
            }
        }

        Ok(())
    }
}
