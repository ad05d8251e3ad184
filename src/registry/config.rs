//! Registry configuration

use std::time::Duration;

use super::key::KEY_CHARS;

/// Default liveness sweep interval (also the allowed silence)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How often the liveness sweep runs. A connection silent for longer
    /// than this is evicted.
    pub sweep_interval: Duration,

    /// Longest stream id the allocator will grow to
    pub max_key_length: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_key_length: KEY_CHARS.len(),
        }
    }
}

impl RegistryConfig {
    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the maximum stream id length (clamped to the alphabet size)
    pub fn max_key_length(mut self, len: usize) -> Self {
        self.max_key_length = len.min(KEY_CHARS.len());
        self
    }
}
