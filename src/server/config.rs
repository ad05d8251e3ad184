//! Server configuration

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::config::DEFAULT_SWEEP_INTERVAL;
use crate::registry::RegistryConfig;

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Frames buffered per connection before fan-out starts dropping
    pub outbound_queue_capacity: usize,

    /// Liveness sweep interval; also the longest silence tolerated
    pub sweep_interval: Duration,

    /// Connection timeout (websocket upgrade must complete within this time)
    pub connection_timeout: Duration,

    /// Longest a single frame write, or the final flush-then-close, may take
    /// before the peer is dropped
    pub write_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            outbound_queue_capacity: 1024,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            connection_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            tcp_nodelay: true, // Payloads are single lines; send them now
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Load from `SHOUT_*` environment variables, falling back to defaults
    ///
    /// - `SHOUT_BIND_ADDR` (e.g. `127.0.0.1:3000`)
    /// - `SHOUT_MAX_CONNECTIONS`
    /// - `SHOUT_SWEEP_INTERVAL` (seconds)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env::var("SHOUT_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: env::var("SHOUT_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            sweep_interval: env::var("SHOUT_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            ..defaults
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-connection outbound queue capacity
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    /// Set the liveness sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Registry configuration derived from this server configuration
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::default().sweep_interval(self.sweep_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:3001".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 3001);
    }

    #[test]
    fn test_builder_queue_capacity_floor() {
        let config = ServerConfig::default().outbound_queue_capacity(0);

        assert_eq!(config.outbound_queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .outbound_queue_capacity(16)
            .sweep_interval(Duration::from_secs(5))
            .connection_timeout(Duration::from_secs(2));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.outbound_queue_capacity, 16);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.connection_timeout, Duration::from_secs(2));
        assert_eq!(config.registry_config().sweep_interval, Duration::from_secs(5));
    }
}
