use std::time::Duration;

use tinyrpc_frame::{FrameConfig, MAX_FRAME_BYTES};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Used by [`Client::connect_to`](crate::Client::connect_to).
    pub connect_timeout: Duration,
    /// Send a keepalive frame this often while connected, so an idle client
    /// is not closed by the server's idle timer. `None` sends none.
    pub keepalive_interval: Option<Duration>,
    /// Request and response bodies of this many bytes or more are rejected.
    pub max_frame_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: None,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}
