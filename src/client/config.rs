//! Client configuration

use std::time::Duration;

use crate::registry::StreamId;

/// Default relay host
pub const DEFAULT_HOST: &str = "localhost:3000";

/// Path of the relay websocket endpoint
pub const WS_PATH: &str = "/api/ws";

/// Streaming session configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay host and port (e.g. `localhost:3000`)
    pub host: String,

    /// How often the keep-alive sends `{ping}`
    pub ping_interval: Duration,

    /// Wait between receiving the stream id and starting the command, so
    /// viewers have time to open the page
    pub startup_delay: Duration,

    /// Bound on connecting and on waiting for the stream id
    pub handshake_timeout: Duration,

    /// Bound on sending one frame, including the wait for the writer
    pub send_timeout: Duration,

    /// Also write each output line to local stdout
    pub echo_output: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ping_interval: Duration::from_secs(10),
            startup_delay: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            echo_output: true,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given relay host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Websocket URL of the relay
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.host, WS_PATH)
    }

    /// Page where viewers watch `stream_id`
    pub fn viewer_url(&self, stream_id: &StreamId) -> String {
        format!("http://{}/{}", self.host, stream_id)
    }

    /// Set the keep-alive interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the startup delay
    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Enable or disable local echo of output lines
    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }
}
