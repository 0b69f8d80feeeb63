//! Typed wire envelope.
//!
//! Every frame on the wire is one JSON object on one line, tagged with a
//! `type` field so receivers never have to guess whether a line is a chat
//! message or a presence list. Timestamps are stamped once, by the server,
//! when the frame is created; rendering and localization are the consumer's
//! concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved sender name for operator broadcasts.
pub const OPERATOR_NAME: &str = "Server";

/// Frames a client sends to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Handshake; the first frame on every (re)connection.
    ///
    /// The name is taken verbatim: empty names and duplicates are allowed.
    Hello {
        /// Display name to register under.
        name: String,
    },
    /// One chat message.
    Chat {
        /// Message body.
        text: String,
    },
}

/// Frames the server sends to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A relayed chat message.
    Chat {
        /// Display name of the sender.
        from: String,
        /// Message body.
        text: String,
        /// When the server relayed the message.
        at: DateTime<Utc>,
    },
    /// A synthesized notice: welcome, join, leave, shutdown.
    System {
        /// Notice text.
        text: String,
        /// When the server produced the notice.
        at: DateTime<Utc>,
    },
    /// The full ordered list of online display names.
    Presence {
        /// Current display names in join order.
        names: Vec<String>,
    },
}

impl ServerFrame {
    /// Build a chat frame stamped with the current time.
    #[must_use]
    pub fn chat(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Chat {
            from: from.into(),
            text: text.into(),
            at: Utc::now(),
        }
    }

    /// Build a system notice stamped with the current time.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            text: text.into(),
            at: Utc::now(),
        }
    }

    /// Build a presence snapshot frame.
    #[must_use]
    pub fn presence(names: Vec<String>) -> Self {
        Self::Presence { names }
    }
}
