//! # chorus-client
//!
//! Client side of the chorus chat service: establishes the connection,
//! performs the `hello` handshake, surfaces server frames as events, and on
//! transport failure keeps reconnecting forever (resending the username on
//! every successful attempt) until explicitly closed.
//!
//! The presentation layer talks to this crate through exactly two surfaces:
//! [`ClientHandle::send`] for outgoing messages and
//! [`ClientHandle::next_event`] / [`ClientHandle::state`] for everything
//! inbound.

#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod state;

pub use config::ClientConfig;
pub use connector::{ClientHandle, Connector, OutgoingSender};
pub use error::ClientError;
pub use state::{ClientEvent, ConnectionState};
