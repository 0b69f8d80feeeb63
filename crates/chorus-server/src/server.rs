//! `ChatServer` — listener, accept loop, and shutdown sequence.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chorus_core::ConnectionId;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::ClientRegistry;
use crate::session;
use crate::shutdown::ShutdownCoordinator;

/// The chat broadcast server.
///
/// Bind first, then obtain a [`ServerHandle`] for the operator side, then
/// [`run`](Self::run) the accept loop to completion.
#[derive(Debug)]
pub struct ChatServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ChatServer {
    /// Bind the configured address.
    ///
    /// Bind failure (address in use, permission denied) is fatal: the
    /// error is returned and no accept loop ever starts.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), config.max_frame_len));
        info!(%local_addr, "server listening");
        Ok(Self {
            config,
            listener,
            local_addr,
            registry,
            broadcaster,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        })
    }

    /// The actually bound address (resolves port `0`).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Operator-facing handle: broadcast, snapshot, stop.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            registry: self.registry.clone(),
            broadcaster: self.broadcaster.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Accept connections until the stop signal, then shut down.
    ///
    /// Accept never blocks on session work: each accepted connection is
    /// spawned immediately and the loop continues. Transient accept errors
    /// are logged and the loop keeps going.
    ///
    /// The shutdown sequence, in order: stop accepting; broadcast a notice
    /// to every registered peer; drain the registry (which closes every
    /// connection and unwinds every session); join sessions within the
    /// grace period, aborting stragglers; release the listening socket.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut sessions = JoinSet::new();
        let stop = self.shutdown.token();

        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                // Reap sessions as they finish; the set holds only live ones.
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "session task failed");
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let id = ConnectionId::new();
                        debug!(conn_id = %id, peer = %peer_addr, "accepted connection");
                        let _ = sessions.spawn(session::run(
                            id,
                            stream,
                            peer_addr,
                            self.registry.clone(),
                            self.broadcaster.clone(),
                            self.config.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        info!(online = self.registry.len(), "shutting down");
        self.broadcaster.system("Server is shutting down.", None);
        let drained = self.registry.drain();
        debug!(drained, "registry drained");

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let drain_all = async {
            while sessions.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain_all).await.is_err() {
            warn!("grace period elapsed, aborting remaining sessions");
            sessions.shutdown().await;
        }
        // Dropping self releases the listener last.
        Ok(())
    }
}

/// Cloneable handle for the operator / presentation layer.
///
/// This is the entire surface the excluded presentation layer gets:
/// broadcast an operator message, read the membership, stop the server.
#[derive(Clone)]
pub struct ServerHandle {
    registry: Arc<ClientRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    /// Broadcast an operator message to every connected peer.
    pub fn operator(&self, text: &str) {
        self.broadcaster.operator(text);
    }

    /// The current display names, in join order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.registry.snapshot()
    }

    /// Number of connected peers.
    #[must_use]
    pub fn online(&self) -> usize {
        self.registry.len()
    }

    /// Initiate the shutdown sequence.
    pub fn stop(&self) {
        self.shutdown.shutdown();
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_shutting_down()
    }
}
