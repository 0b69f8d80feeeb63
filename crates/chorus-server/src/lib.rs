//! # chorus-server
//!
//! The chat broadcast server: tracks live connections in an
//! insertion-ordered registry, fans messages out to all-but-sender, keeps
//! every client's "online users" view current, and survives any individual
//! peer failing at any point.
//!
//! Structure:
//!
//! - [`registry::ClientRegistry`]: the one mutual-exclusion domain around
//!   connection state
//! - [`broadcast::Broadcaster`]: serialize-once fan-out and dead-peer
//!   pruning
//! - `session`: per-connection handshake, read loop, and teardown
//! - [`server::ChatServer`]: listener, accept loop, and the shutdown
//!   sequence
//!
//! One tokio task per connection reads frames; a second drains that
//! connection's outbound queue. No network write ever happens while the
//! registry lock is held, so a stalled peer can never block admission or
//! removal of any other peer.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod server;
mod session;
pub mod shutdown;

pub use broadcast::Broadcaster;
pub use config::ServerConfig;
pub use error::ServerError;
pub use registry::ClientRegistry;
pub use server::{ChatServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
