//! Per-connection session lifecycle: handshake, read loop, teardown.
//!
//! Each accepted connection runs as two tasks. The session task owns the
//! read half and drives handshake → message loop → teardown. A writer task
//! owns the write half and drains the connection's outbound queue; when the
//! queue closes (the entry was pruned or the registry drained) it flushes
//! what was already enqueued, closes the socket, and cancels the session's
//! local token so a reader blocked on a silent peer also exits.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chorus_core::{ClientFrame, ConnectionId, FrameCodec, ServerFrame};
use futures::StreamExt;
use metrics::counter;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::metrics::{CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL};
use crate::registry::ClientRegistry;

/// Run one session to completion. Never fails the server: every error path
/// ends in this session's own teardown.
#[instrument(name = "session", skip_all, fields(conn_id = %id, peer = %peer_addr))]
pub(crate) async fn run(
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    broadcaster: Arc<Broadcaster>,
    config: ServerConfig,
) {
    let (read_half, write_half) = stream.into_split();
    let local = CancellationToken::new();
    let (outbox, outbox_rx) = mpsc::channel::<Bytes>(config.outbox_capacity);
    let writer = tokio::spawn(write_loop(write_half, outbox_rx, local.clone()));
    let mut frames = FramedRead::new(
        read_half,
        FrameCodec::<ClientFrame>::new(config.max_frame_len),
    );

    // Handshake: the first frame must be `hello`; anything else closes the
    // connection without registering.
    let name = tokio::select! {
        () = local.cancelled() => None,
        first = frames.next() => match first {
            Some(Ok(ClientFrame::Hello { name })) => Some(name),
            Some(Ok(ClientFrame::Chat { .. })) => {
                info!("first frame was not hello, closing");
                None
            }
            Some(Err(e)) => {
                debug!(error = %e, "handshake read failed");
                None
            }
            None => {
                debug!("connection closed before handshake");
                None
            }
        },
    };
    let Some(name) = name else {
        drop(outbox);
        let _ = writer.await;
        return;
    };

    registry.register(id, name.clone(), outbox);
    counter!(CONNECTIONS_TOTAL).increment(1);
    info!(name, "client joined");

    // Welcome goes only to the new peer; count and list include them.
    let names = registry.snapshot();
    let welcome = format!(
        "Welcome {name}! Online users ({}): {}",
        names.len(),
        names.join(", ")
    );
    let _ = broadcaster.send_to(id, &ServerFrame::system(welcome));
    broadcaster.publish_presence();
    broadcaster.system(format!("{name} has joined the chat!"), Some(id));

    loop {
        tokio::select! {
            () = local.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(ClientFrame::Chat { text })) => {
                    broadcaster.chat(&name, &text, Some(id));
                }
                Some(Ok(ClientFrame::Hello { .. })) => {
                    debug!("stray hello after handshake ignored");
                }
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    break;
                }
                None => break,
            },
        }
    }

    // Teardown. If the handle is already gone a broadcast pruned us first;
    // that path owes no "has left" notice and closed our queue already.
    if registry.unregister(id).is_some() {
        counter!(DISCONNECTIONS_TOTAL).increment(1);
        info!(name, "client left");
        broadcaster.publish_presence();
        broadcaster.system(format!("{name} has left the chat."), None);
    }
    let _ = writer.await;
}

/// Drain the outbound queue onto the socket.
///
/// Exits when the queue closes or a write fails; either way the write half
/// is shut down and the session's local token cancelled.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbox: mpsc::Receiver<Bytes>,
    local: CancellationToken,
) {
    while let Some(line) = outbox.recv().await {
        if let Err(e) = write_half.write_all(&line).await {
            debug!(error = %e, "write failed");
            break;
        }
    }
    outbox.close();
    let _ = write_half.shutdown().await;
    local.cancel();
}
