//! Shutdown signaling via `CancellationToken`.

use tokio_util::sync::CancellationToken;

/// Owns the token that turns the accept loop off.
///
/// The actual shutdown sequence (notify peers, drain the registry, join
/// sessions) lives in `ChatServer::run`; this type only carries the signal
/// between the operator-facing handle and the loop.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a clone of the cancellation token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}
