//! Streaming session
//!
//! Registers as a producer and pipes a command's output to the relay.
//!
//! Two activities share the connection once the stream id is known:
//! - keep-alive: sends `{ping}` every `ping_interval`
//! - forwarding: sends one `{payload}` per output line
//!
//! Both write through [`FrameSender`], which serializes frames behind a
//! mutex and bounds every send by the configured send timeout. A
//! [`CancellationToken`] ends the keep-alive when forwarding finishes, and
//! ends forwarding when the connection breaks, even mid-send.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{ClientFrame, ServerFrame};
use crate::registry::StreamId;

use super::config::ClientConfig;
use super::source::LineSource;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serialized writer shared by the session's activities
#[derive(Clone)]
pub struct FrameSender {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    timeout: Duration,
}

impl FrameSender {
    fn new(sink: SplitSink<WsStream, Message>, timeout: Duration) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            timeout,
        }
    }

    /// Send one frame; concurrent callers are queued on the lock
    ///
    /// Waiting for the lock counts against the send timeout.
    pub async fn send(&self, frame: &ClientFrame) -> Result<()> {
        let text = frame.to_json();

        tokio::time::timeout(self.timeout, async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(text)).await
        })
        .await
        .map_err(|_| Error::SendTimeout)??;

        Ok(())
    }

    /// Send one frame unless `token` is cancelled first
    pub async fn send_until(&self, frame: &ClientFrame, token: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = token.cancelled() => Err(Error::ConnectionClosed),
            result = self.send(frame) => result,
        }
    }

    async fn close(&self) {
        let closed = tokio::time::timeout(self.timeout, async {
            self.sink.lock().await.close().await
        })
        .await;

        match closed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Close handshake failed"),
            Err(_) => tracing::debug!("Close handshake timed out"),
        }
    }
}

/// Outcome of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stream_id: StreamId,
    /// Lines sent as payload frames
    pub lines_forwarded: u64,
    /// Exit status of the command
    pub exit_status: ExitStatus,
}

/// A producer connection with an assigned stream id
pub struct StreamingSession {
    config: ClientConfig,
    stream_id: StreamId,
    sender: FrameSender,
    incoming: SplitStream<WsStream>,
}

impl StreamingSession {
    /// Connect, send `initialize`, and wait for the stream id
    pub async fn connect(config: ClientConfig, source_command: Option<String>) -> Result<Self> {
        let url = config.ws_url();

        let (ws, _) = tokio::time::timeout(
            config.handshake_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| Error::Handshake(format!("timed out connecting to {}", url)))??;

        let (sink, mut incoming) = ws.split();
        let sender = FrameSender::new(sink, config.send_timeout);

        sender
            .send(&ClientFrame::Initialize { source_command })
            .await?;

        let stream_id = tokio::time::timeout(config.handshake_timeout, await_stream_id(&mut incoming))
            .await
            .map_err(|_| Error::Handshake("timed out waiting for a stream id".into()))??;

        tracing::info!(stream = %stream_id, url = %url, "Stream initialized");

        Ok(Self {
            config,
            stream_id,
            sender,
            incoming,
        })
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Page where viewers watch this stream
    pub fn viewer_url(&self) -> String {
        self.config.viewer_url(&self.stream_id)
    }

    /// Run `command` and forward its output until it ends, then close
    pub async fn run(self, command: &[String]) -> Result<SessionSummary> {
        if command.is_empty() {
            return Err(Error::EmptyCommand);
        }

        let Self {
            config,
            stream_id,
            sender,
            incoming,
        } = self;

        let token = CancellationToken::new();

        let reader = tokio::spawn(drain_incoming(incoming, token.clone()));
        let keep_alive = tokio::spawn(keep_alive(
            sender.clone(),
            config.ping_interval,
            token.clone(),
        ));

        let forwarded = forward(&config, &sender, command, &token).await;

        token.cancel();
        let pinged = match keep_alive.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Keep-alive task failed");
                Ok(())
            }
        };

        sender.close().await;
        reader.abort();

        let (lines_forwarded, exit_status) = match (forwarded, pinged) {
            (Ok(done), Ok(())) => done,
            (Err(Error::ConnectionClosed), Err(e)) | (Ok(_), Err(e)) => return Err(e),
            (Err(e), _) => return Err(e),
        };

        tracing::info!(
            stream = %stream_id,
            lines = lines_forwarded,
            status = %exit_status,
            "Session finished"
        );

        Ok(SessionSummary {
            stream_id,
            lines_forwarded,
            exit_status,
        })
    }
}

async fn await_stream_id(incoming: &mut SplitStream<WsStream>) -> Result<StreamId> {
    while let Some(msg) = incoming.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        return match ServerFrame::parse(&text)? {
            ServerFrame::StreamId { stream_id } => Ok(stream_id),
            ServerFrame::Error { error } => Err(Error::Rejected {
                short: error.short,
                msg: error.msg,
            }),
            other => Err(Error::Handshake(format!("unexpected reply: {:?}", other))),
        };
    }

    Err(Error::Handshake(
        "connection closed before a stream id arrived".into(),
    ))
}

async fn keep_alive(
    sender: FrameSender,
    interval: Duration,
    token: CancellationToken,
) -> Result<()> {
    loop {
        match sender.send_until(&ClientFrame::Ping, &token).await {
            Ok(()) => {}
            Err(Error::ConnectionClosed) if token.is_cancelled() => return Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Unable to send ping");
                token.cancel();
                return Err(e);
            }
        }

        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn forward(
    config: &ClientConfig,
    sender: &FrameSender,
    command: &[String],
    token: &CancellationToken,
) -> Result<(u64, ExitStatus)> {
    if !config.startup_delay.is_zero() {
        tokio::select! {
            _ = token.cancelled() => return Err(Error::ConnectionClosed),
            _ = tokio::time::sleep(config.startup_delay) => {}
        }
    }

    let mut source = LineSource::spawn(command)?;
    let mut stdout = tokio::io::stdout();
    let mut lines = 0u64;

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => {
                source.kill().await;
                return Err(Error::ConnectionClosed);
            }
            line = source.next_line() => line?,
        };

        let Some(line) = line else { break };

        if config.echo_output {
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }

        if let Err(e) = sender
            .send_until(&ClientFrame::Payload { data: Some(line) }, token)
            .await
        {
            source.kill().await;
            return Err(e);
        }
        lines += 1;
    }

    let status = source.wait().await?;
    Ok((lines, status))
}

/// Read server frames until the connection ends, then cancel the session
async fn drain_incoming(mut incoming: SplitStream<WsStream>, token: CancellationToken) {
    while let Some(msg) = incoming.next().await {
        match msg {
            Ok(Message::Text(text)) => match ServerFrame::parse(&text) {
                Ok(ServerFrame::Pong { .. }) => tracing::trace!("pong"),
                Ok(ServerFrame::Error { error }) => {
                    tracing::error!(code = %error.short, msg = %error.msg, "Server reported an error");
                }
                Ok(other) => tracing::debug!(frame = ?other, "Unexpected frame"),
                Err(e) => tracing::warn!(error = %e, "Unreadable frame from server"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Connection error");
                break;
            }
        }
    }

    tracing::debug!("Server closed the connection");
    token.cancel();
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::net::TcpListener;

    use super::*;
    use crate::server::{RelayServer, ServerConfig};

    async fn start_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::new(ServerConfig::with_addr(addr));

        tokio::spawn(async move {
            let _ = server.serve_until(listener, std::future::pending()).await;
        });

        addr
    }

    fn config(addr: SocketAddr) -> ClientConfig {
        ClientConfig::new(addr.to_string())
            .ping_interval(Duration::from_millis(50))
            .startup_delay(Duration::ZERO)
            .handshake_timeout(Duration::from_secs(5))
            .echo_output(false)
    }

    #[tokio::test]
    async fn test_connect_assigns_stream_id() {
        let addr = start_server().await;

        let session = StreamingSession::connect(config(addr), Some("echo hi".into()))
            .await
            .unwrap();

        assert_eq!(session.stream_id().len(), 4);
        assert_eq!(
            session.viewer_url(),
            format!("http://{}/{}", addr, session.stream_id())
        );
    }

    #[tokio::test]
    async fn test_run_forwards_lines() {
        let addr = start_server().await;
        let session = StreamingSession::connect(config(addr), None).await.unwrap();
        let stream_id = session.stream_id().clone();

        let command = vec!["printf".to_string(), "a\\nb\\nc\\n".to_string()];
        let summary = session.run(&command).await.unwrap();

        assert_eq!(summary.stream_id, stream_id);
        assert_eq!(summary.lines_forwarded, 3);
        assert!(summary.exit_status.success());
    }

    #[tokio::test]
    async fn test_keep_alive_outlives_sweep() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server =
            RelayServer::new(ServerConfig::with_addr(addr).sweep_interval(Duration::from_millis(200)));
        let registry = Arc::clone(server.registry());
        tokio::spawn(async move {
            let _ = server.serve_until(listener, std::future::pending()).await;
        });

        let session = StreamingSession::connect(config(addr), None).await.unwrap();
        let stream_id = session.stream_id().clone();

        // Outlasts several sweeps; pings every 50ms keep the stream alive
        let command = vec!["sleep".to_string(), "1".to_string()];
        let summary = session.run(&command).await.unwrap();

        assert!(summary.exit_status.success());
        assert_eq!(summary.lines_forwarded, 0);

        // Once the session closed, the stream goes away
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.stream_exists(&stream_id).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_server_ends_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Hands out an id, then never reads again
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.next().await;
            let reply = ServerFrame::stream_id(StreamId::new("abcd")).to_json();
            ws.send(Message::Text(reply)).await.unwrap();
            let _held = ws;
            std::future::pending::<()>().await;
        });

        let config = config(addr).send_timeout(Duration::from_millis(300));
        let session = StreamingSession::connect(config, None).await.unwrap();

        let command = vec!["yes".to_string(), "x".repeat(1024)];
        let result = tokio::time::timeout(Duration::from_secs(10), session.run(&command))
            .await
            .expect("session hung on a server that stopped reading");

        assert!(matches!(result, Err(Error::SendTimeout)));
        server.abort();
    }

    #[tokio::test]
    async fn test_empty_command() {
        let addr = start_server().await;
        let session = StreamingSession::connect(config(addr), None).await.unwrap();

        assert!(matches!(session.run(&[]).await, Err(Error::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to find a closed port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = StreamingSession::connect(config(addr), None).await;
        assert!(result.is_err());
    }
}
