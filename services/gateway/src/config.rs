//! Gateway configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;
pub const DEFAULT_BUFFER_SIZE: usize = 8_192;
/// Hard cap on per-socket buffer sizes.
pub const MAX_BUFFER_SIZE: usize = 65_536;
pub const DEFAULT_THREAD_COUNT: usize = 4;
/// Dispatch FIFO capacity; sends beyond this fail with `QueueFull`.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1 << 20;
/// Default admission limit, effectively unthrottled.
pub const DEFAULT_RATE_LIMIT: usize = 1_000_000;

/// Server tunables, assembled from CLI flags by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// TCP port to bind on 0.0.0.0.
    pub port: u16,
    /// Hard cap on concurrent sessions.
    pub max_connections: usize,
    /// Per-socket send/receive buffer and read-scratch size (bytes).
    pub buffer_size: usize,
    /// Worker pool size; immutable while running.
    pub thread_count: usize,
    /// Pin worker `i` to CPU `i mod N`.
    pub affinity_enabled: bool,
    /// Dispatch FIFO capacity.
    pub queue_capacity: usize,
    /// Throttler admission limit (messages per second).
    pub rate_limit: usize,
    /// Spin the dispatcher at 10us granularity; `false` trades tail latency
    /// for an idle queue that costs no CPU.
    pub busy_poll: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            thread_count: DEFAULT_THREAD_COUNT,
            affinity_enabled: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            rate_limit: DEFAULT_RATE_LIMIT,
            busy_poll: true,
        }
    }
}

impl GatewayConfig {
    /// Buffer size clamped to [`MAX_BUFFER_SIZE`].
    pub fn clamped_buffer_size(&self) -> usize {
        self.buffer_size.min(MAX_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_is_clamped() {
        let config = GatewayConfig {
            buffer_size: 1 << 20,
            ..Default::default()
        };
        assert_eq!(config.clamped_buffer_size(), MAX_BUFFER_SIZE);

        let config = GatewayConfig::default();
        assert_eq!(config.clamped_buffer_size(), DEFAULT_BUFFER_SIZE);
    }
}
