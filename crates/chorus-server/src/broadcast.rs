//! Fan-out delivery and dead-peer pruning.
//!
//! A broadcast serializes its frame exactly once and enqueues the same
//! shared bytes to every registered peer except the optional excluded
//! sender. A recipient whose queue is closed or full is dead: it gets
//! unregistered on the spot (dropping its queue, which closes its socket),
//! and the fan-out continues to everyone else. A broadcast that pruned
//! anyone triggers exactly one presence refresh afterwards.

use std::sync::Arc;

use chorus_core::{encode_frame, ConnectionId, ServerFrame, OPERATOR_NAME};
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::{BROADCASTS_TOTAL, DELIVERY_FAILURES_TOTAL, PRESENCE_UPDATES_TOTAL};
use crate::registry::ClientRegistry;

/// Delivers frames to the current registry membership.
#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
    max_frame_len: usize,
}

impl Broadcaster {
    /// Create a broadcaster over a registry.
    #[must_use]
    pub fn new(registry: Arc<ClientRegistry>, max_frame_len: usize) -> Self {
        Self {
            registry,
            max_frame_len,
        }
    }

    /// Deliver `frame` to every registered peer except `exclude`.
    ///
    /// Delivery is at-most-once per recipient, order across recipients
    /// unspecified. Partial failure never aborts the fan-out.
    pub fn broadcast(&self, frame: &ServerFrame, exclude: Option<ConnectionId>) {
        let line = match encode_frame(frame, self.max_frame_len) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode broadcast frame");
                return;
            }
        };
        counter!(BROADCASTS_TOTAL).increment(1);
        let dead = self.registry.fan_out(&line, exclude);
        if !dead.is_empty() {
            self.prune(&dead);
            // One refresh for the whole broadcast, however many died.
            self.publish_presence();
        }
    }

    /// Broadcast a chat message from a named sender.
    pub fn chat(&self, from: &str, text: &str, exclude: Option<ConnectionId>) {
        self.broadcast(&ServerFrame::chat(from, text), exclude);
    }

    /// Broadcast a synthesized system notice.
    pub fn system(&self, text: impl Into<String>, exclude: Option<ConnectionId>) {
        self.broadcast(&ServerFrame::system(text), exclude);
    }

    /// Broadcast an operator message under the reserved `Server` name,
    /// excluding no one.
    pub fn operator(&self, text: &str) {
        self.broadcast(&ServerFrame::chat(OPERATOR_NAME, text), None);
    }

    /// Send a frame to a single peer.
    ///
    /// Returns `false` if the peer is gone or rejected the frame; callers
    /// that care (the welcome message) can leave the cleanup to the peer's
    /// own session.
    pub fn send_to(&self, id: ConnectionId, frame: &ServerFrame) -> bool {
        match encode_frame(frame, self.max_frame_len) {
            Ok(line) => self.registry.send_to(id, line),
            Err(e) => {
                warn!(error = %e, conn_id = %id, "failed to encode frame");
                false
            }
        }
    }

    /// Push a fresh presence snapshot to every registered peer.
    ///
    /// Runs rounds until one completes with no delivery failure: a failed
    /// recipient is pruned, and the prune is itself a membership change, so
    /// the post-prune membership gets republished. Terminates because each
    /// extra round requires the registry to have shrunk.
    pub fn publish_presence(&self) {
        loop {
            match self.registry.publish_presence(self.max_frame_len) {
                Ok(dead) if dead.is_empty() => {
                    counter!(PRESENCE_UPDATES_TOTAL).increment(1);
                    return;
                }
                Ok(dead) => self.prune(&dead),
                Err(e) => {
                    warn!(error = %e, "failed to encode presence frame");
                    return;
                }
            }
        }
    }

    /// Unregister peers whose delivery failed.
    ///
    /// Dropping the registry entry closes the peer's outbound queue; its
    /// writer task then closes the socket and its session unwinds, finding
    /// the handle already unregistered. No "has left" notice is broadcast
    /// for pruned peers.
    fn prune(&self, dead: &[ConnectionId]) {
        for id in dead {
            counter!(DELIVERY_FAILURES_TOTAL).increment(1);
            if let Some(name) = self.registry.unregister(*id) {
                debug!(conn_id = %id, name, "pruned unreachable peer");
            }
        }
    }
}
