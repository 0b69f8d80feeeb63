//! Connection state and the event stream surfaced to the presentation
//! layer.

use std::fmt;

use chorus_core::ServerFrame;
use chrono::{DateTime, Utc};

/// Coarse connection state, published through a `watch` cell and as
/// [`ClientEvent::State`] changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted (terminal after close).
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and registered with the server.
    Connected,
    /// Connection lost; retrying forever until one attempt succeeds.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting…",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting…",
        };
        f.write_str(label)
    }
}

/// Everything the presentation layer can observe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// The connection state changed.
    State(ConnectionState),
    /// A chat message arrived.
    Chat {
        /// Display name of the sender.
        from: String,
        /// Message body.
        text: String,
        /// Server-side timestamp.
        at: DateTime<Utc>,
    },
    /// A system notice arrived.
    System {
        /// Notice text.
        text: String,
        /// Server-side timestamp.
        at: DateTime<Utc>,
    },
    /// A fresh presence snapshot arrived.
    Presence {
        /// Online display names in join order.
        names: Vec<String>,
    },
    /// An outgoing message was consumed while not connected; it will not
    /// be delivered or retried.
    DeliveryFailed {
        /// The message that was dropped.
        text: String,
    },
}

impl From<ServerFrame> for ClientEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::Chat { from, text, at } => Self::Chat { from, text, at },
            ServerFrame::System { text, at } => Self::System { text, at },
            ServerFrame::Presence { names } => Self::Presence { names },
        }
    }
}
