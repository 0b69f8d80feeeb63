//! Client configuration.

use chorus_core::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};

/// Configuration for one logical client session.
///
/// The server address and display name are immutable for the lifetime of
/// the session; the name is resent on every successful reconnect.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host to connect to.
    pub host: String,
    /// Server port to connect to.
    pub port: u16,
    /// Display name sent in the handshake; taken verbatim.
    pub name: String,
    /// Maximum encoded frame length in bytes.
    pub max_frame_len: usize,
}

impl ClientConfig {
    /// Create a config with the default frame length cap.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            name: name.into(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// The `host:port` string to connect to.
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
