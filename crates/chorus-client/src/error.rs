//! Client error types.

use std::io;

use chorus_core::FrameError;
use thiserror::Error;

/// Errors surfaced by the client library.
///
/// Once connected, transport failures are not errors: they move the state
/// machine into `Reconnecting`. Only the initial connect (and the handle
/// being used after close) surface here.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The initial connection could not be established.
    #[error("failed to connect to {addr}")]
    Connect {
        /// The address that could not be reached.
        addr: String,
        /// The underlying connect failure.
        #[source]
        source: io::Error,
    },
    /// Framing or envelope failure.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Transport I/O failure during the handshake.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The client was closed and can no longer send.
    #[error("client is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_names_the_address() {
        let err = ClientError::Connect {
            addr: "10.0.0.1:12345".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.to_string(), "failed to connect to 10.0.0.1:12345");
    }

    #[test]
    fn frame_error_converts() {
        let err: ClientError = FrameError::Oversize { max: 16 }.into();
        assert!(matches!(err, ClientError::Frame(_)));
    }
}
