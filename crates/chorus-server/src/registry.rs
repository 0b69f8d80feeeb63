//! The client registry: the single source of truth for "who is online".
//!
//! One `parking_lot::Mutex` around an insertion-ordered map is the entire
//! concurrency story. Every operation that reads or mutates membership
//! takes the lock, so an iteration can never observe a handle mid-removal
//! and two teardown paths can never both remove the same entry. Nothing
//! slow happens under the lock: delivery is a bounded-queue `try_send`, and
//! the actual socket writes run in per-connection writer tasks.

use bytes::Bytes;
use chorus_core::{encode_frame, ConnectionId, FrameError, ServerFrame};
use indexmap::IndexMap;
use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::metrics::CONNECTIONS_ACTIVE;

/// One registered peer: display name plus the sending end of its outbound
/// queue. Dropping the entry drops the sender, which lets the peer's writer
/// task drain, close the socket, and unwind the session.
#[derive(Debug)]
struct Peer {
    name: String,
    outbox: mpsc::Sender<Bytes>,
}

/// Insertion-ordered map of live connections, serialized by one mutex.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    inner: Mutex<IndexMap<ConnectionId, Peer>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a display name.
    ///
    /// Names are not required to be unique; the handle is the key.
    pub fn register(&self, id: ConnectionId, name: String, outbox: mpsc::Sender<Bytes>) {
        let mut inner = self.inner.lock();
        let _ = inner.insert(id, Peer { name, outbox });
        Self::record_active(inner.len());
    }

    /// Remove a connection, returning its display name if it was present.
    ///
    /// A no-op on an absent handle: a session's own teardown may race a
    /// broadcast-induced prune, and whichever runs second must do nothing.
    pub fn unregister(&self, id: ConnectionId) -> Option<String> {
        let mut inner = self.inner.lock();
        // shift_remove keeps the remaining entries in join order.
        let removed = inner.shift_remove(&id);
        Self::record_active(inner.len());
        removed.map(|peer| peer.name)
    }

    /// Whether a handle is currently registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.lock().contains_key(&id)
    }

    /// The current display names, in join order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .values()
            .map(|peer| peer.name.clone())
            .collect()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Enqueue an encoded line to every registered peer except `exclude`.
    ///
    /// Returns the handles whose queue was closed or full; the caller
    /// prunes them. The fan-out itself never stops early.
    pub fn fan_out(&self, line: &Bytes, exclude: Option<ConnectionId>) -> Vec<ConnectionId> {
        let inner = self.inner.lock();
        inner
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .filter(|(_, peer)| peer.outbox.try_send(line.clone()).is_err())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Enqueue an encoded line to a single peer.
    ///
    /// Returns `false` if the handle is absent or its queue rejected the
    /// line.
    pub fn send_to(&self, id: ConnectionId, line: Bytes) -> bool {
        let inner = self.inner.lock();
        match inner.get(&id) {
            Some(peer) => peer.outbox.try_send(line).is_ok(),
            None => false,
        }
    }

    /// Snapshot the membership and enqueue the presence frame to every
    /// registered peer, all in one critical section.
    ///
    /// Holding the lock across snapshot-and-enqueue is what makes presence
    /// delivery per-peer monotonic: no peer's queue can receive a stale
    /// snapshot after a fresher one. Returns the handles that failed
    /// delivery.
    pub fn publish_presence(&self, max_frame_len: usize) -> Result<Vec<ConnectionId>, FrameError> {
        let inner = self.inner.lock();
        let names: Vec<String> = inner.values().map(|peer| peer.name.clone()).collect();
        let line = encode_frame(&ServerFrame::presence(names), max_frame_len)?;
        Ok(inner
            .iter()
            .filter(|(_, peer)| peer.outbox.try_send(line.clone()).is_err())
            .map(|(id, _)| *id)
            .collect())
    }

    /// Remove every entry, dropping all outbound queues.
    ///
    /// Used by server shutdown: once an entry is gone its writer drains
    /// whatever was already enqueued, closes the socket, and the session
    /// unwinds through its normal teardown (which finds the handle already
    /// unregistered). Returns how many entries were drained.
    pub fn drain(&self) -> usize {
        let mut inner = self.inner.lock();
        let drained = inner.len();
        inner.clear();
        Self::record_active(0);
        drained
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active(len: usize) {
        gauge!(CONNECTIONS_ACTIVE).set(len as f64);
    }
}
