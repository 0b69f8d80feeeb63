//! Server configuration.

use chorus_core::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};

/// Configuration for the chat server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum encoded frame length in bytes.
    pub max_frame_len: usize,
    /// Per-connection outbound queue depth; a peer whose queue is full is
    /// treated as dead.
    pub outbox_capacity: usize,
    /// Seconds to wait for sessions to unwind during shutdown before
    /// aborting them.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            outbox_capacity: 64,
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    /// The `host:port` string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
