use std::time::Duration;

use tinyrpc_frame::{FrameConfig, MAX_FRAME_BYTES};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9000";

/// Default number of worker event loops.
pub const DEFAULT_WORKERS: usize = 6;

/// Default idle timeout per connection.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default period between registry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub bind_addr: String,
    /// Number of worker threads, each with its own event loop. Must be > 0.
    pub workers: usize,
    /// A connection that delivers no complete frame for this long is closed.
    /// Zero disables the timer.
    pub idle_timeout: Duration,
    /// How often closed connections are evicted from the registry.
    ///
    /// Zero disables the sweeper. The registry then keeps one entry for
    /// every connection ever accepted until the server shuts down, so only
    /// use it for short-lived servers.
    pub sweep_interval: Duration,
    /// Frame bodies of this many bytes or more close the connection.
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            workers: DEFAULT_WORKERS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

impl ServerConfig {
    /// Default settings listening on every interface at `port`.
    pub fn on_port(port: u16) -> Self {
        Self::default().with_bind_addr(format!("0.0.0.0:{port}"))
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Frame codec settings derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.workers, 6);
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.frame_config().max_frame_bytes, MAX_FRAME_BYTES);
    }

    #[test]
    fn builders_override_fields() {
        let config = ServerConfig::on_port(9100)
            .with_workers(2)
            .with_idle_timeout(Duration::ZERO)
            .with_max_frame_bytes(1024);
        assert_eq!(config.bind_addr, "0.0.0.0:9100");
        assert_eq!(config.workers, 2);
        assert!(config.idle_timeout.is_zero());
        assert_eq!(config.frame_config().max_frame_bytes, 1024);
    }
}
