//! Server error types.

use std::io;

use thiserror::Error;

/// Fatal server errors.
///
/// Per-peer I/O failures never surface here; they terminate only the
/// affected session.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind the configured address.
    #[error("failed to bind {addr}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying bind failure.
        #[source]
        source: io::Error,
    },
    /// Listener-level I/O failure outside of bind.
    #[error(transparent)]
    Io(#[from] io::Error),
}
