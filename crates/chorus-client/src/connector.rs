//! Connection establishment and the reconnection state machine.
//!
//! `Disconnected → Connecting → Connected → Reconnecting → Connected | …`
//!
//! The initial connect is the caller's problem: [`Connector::connect`]
//! returns an error and the caller may retry. Once a connection has been
//! established, the driver task owns the socket for good — any read or
//! write failure moves it to `Reconnecting`, where it retries forever with
//! the injected backoff policy, resending `hello` on every attempt, until
//! one succeeds or the handle is closed. There is deliberately no retry
//! cap; the presentation layer surfaces the `Reconnecting` state instead.
//!
//! While not connected, outgoing messages are consumed and reported back as
//! [`ClientEvent::DeliveryFailed`] — no buffering, no retry.

use std::sync::Arc;

use chorus_core::{
    encode_frame, ClientFrame, FixedDelay, FrameCodec, ReconnectPolicy, ServerFrame,
};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::state::{ClientEvent, ConnectionState};

const OUTGOING_QUEUE: usize = 32;
const EVENT_QUEUE: usize = 256;

/// Builds a connected [`ClientHandle`].
pub struct Connector {
    config: ClientConfig,
    policy: Arc<dyn ReconnectPolicy>,
}

impl Connector {
    /// Create a connector with the default fixed-delay reconnect policy.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            policy: Arc::new(FixedDelay::default()),
        }
    }

    /// Replace the reconnect backoff policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Connect, send `hello`, and spawn the driver task.
    ///
    /// Initial connect failure is returned to the caller; only failures
    /// after this point enter the reconnect loop.
    pub async fn connect(self) -> Result<ClientHandle, ClientError> {
        let stream = establish(&self.config).await?;
        info!(addr = %self.config.server_addr(), name = %self.config.name, "connected");

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let cancel = CancellationToken::new();

        let driver = Driver {
            config: self.config,
            policy: self.policy,
            outgoing: outgoing_rx,
            events: event_tx,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run(stream));

        Ok(ClientHandle {
            outgoing: outgoing_tx,
            events: event_rx,
            state: state_rx,
            cancel,
            task,
        })
    }
}

/// Handle through which the presentation layer drives one logical session.
#[derive(Debug)]
pub struct ClientHandle {
    outgoing: mpsc::Sender<String>,
    events: mpsc::Receiver<ClientEvent>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ClientHandle {
    /// Submit an outgoing chat message.
    ///
    /// Delivery is best-effort: if the client is currently reconnecting the
    /// message is consumed and reported as [`ClientEvent::DeliveryFailed`].
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.outgoing
            .send(text.into())
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Receive the next event; `None` after the driver has exited.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// A cloneable sender for submitting outgoing messages from another
    /// task, so the input side of a presentation layer can run on its own
    /// execution context.
    #[must_use]
    pub fn sender(&self) -> OutgoingSender {
        OutgoingSender(self.outgoing.clone())
    }

    /// The current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A watch receiver for state changes, for callers that want to await
    /// them independently of the event stream.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the client ("user closed the window"): exits the state
    /// machine from any state into terminal `Disconnected`.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait for the driver task to finish after [`close`](Self::close).
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}

/// Cloneable sender for outgoing chat messages.
#[derive(Clone)]
pub struct OutgoingSender(mpsc::Sender<String>);

impl OutgoingSender {
    /// Submit an outgoing chat message; same semantics as
    /// [`ClientHandle::send`].
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.0
            .send(text.into())
            .await
            .map_err(|_| ClientError::Closed)
    }
}

/// Connect and perform the `hello` handshake.
async fn establish(config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let addr = config.server_addr();
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ClientError::Connect { addr, source })?;
    let hello = encode_frame(
        &ClientFrame::Hello {
            name: config.name.clone(),
        },
        config.max_frame_len,
    )?;
    stream.write_all(&hello).await?;
    Ok(stream)
}

enum Outcome {
    /// Transport failed; enter `Reconnecting`.
    Lost,
    /// Close requested or the handle was dropped; exit the machine.
    Exit,
}

struct Driver {
    config: ClientConfig,
    policy: Arc<dyn ReconnectPolicy>,
    outgoing: mpsc::Receiver<String>,
    events: mpsc::Sender<ClientEvent>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl Driver {
    #[instrument(name = "client", skip_all, fields(name = %self.config.name))]
    async fn run(mut self, mut stream: TcpStream) {
        self.emit(ClientEvent::State(ConnectionState::Connected)).await;
        loop {
            if matches!(self.drive_connected(stream).await, Outcome::Exit) {
                break;
            }
            self.set_state(ConnectionState::Reconnecting).await;
            match self.reconnect().await {
                Some(fresh) => {
                    stream = fresh;
                    self.set_state(ConnectionState::Connected).await;
                }
                None => break,
            }
        }
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Pump one live connection until it fails or the client is closed.
    async fn drive_connected(&mut self, stream: TcpStream) -> Outcome {
        let (read_half, mut write_half) = stream.into_split();
        let mut frames = FramedRead::new(
            read_half,
            FrameCodec::<ServerFrame>::new(self.config.max_frame_len),
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Outcome::Exit,
                frame = frames.next() => match frame {
                    Some(Ok(frame)) => self.emit(frame.into()).await,
                    Some(Err(e)) => {
                        debug!(error = %e, "read failed");
                        return Outcome::Lost;
                    }
                    None => {
                        debug!("server closed the connection");
                        return Outcome::Lost;
                    }
                },
                msg = self.outgoing.recv() => match msg {
                    Some(text) => {
                        if let Err(e) = self.write_chat(&mut write_half, &text).await {
                            debug!(error = %e, "write failed");
                            // The message was consumed but never delivered.
                            self.emit(ClientEvent::DeliveryFailed { text }).await;
                            return Outcome::Lost;
                        }
                    }
                    None => return Outcome::Exit,
                },
            }
        }
    }

    async fn write_chat(
        &self,
        write_half: &mut tokio::net::tcp::OwnedWriteHalf,
        text: &str,
    ) -> Result<(), ClientError> {
        let line = encode_frame(
            &ClientFrame::Chat { text: text.into() },
            self.config.max_frame_len,
        )?;
        write_half.write_all(&line).await?;
        Ok(())
    }

    /// Retry connect-and-hello after the policy delay until one attempt
    /// succeeds or the client is closed. Sends submitted in the meantime
    /// are consumed and reported as failed, and close is honored even
    /// while an attempt is in flight.
    async fn reconnect(&mut self) -> Option<TcpStream> {
        let mut attempt: u32 = 0;
        loop {
            let deadline = tokio::time::Instant::now() + self.policy.delay(attempt);
            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => return None,
                    () = tokio::time::sleep_until(deadline) => break,
                    msg = self.outgoing.recv() => match msg {
                        Some(text) => self.emit(ClientEvent::DeliveryFailed { text }).await,
                        None => return None,
                    },
                }
            }
            let connecting = establish(&self.config);
            tokio::pin!(connecting);
            let result = loop {
                tokio::select! {
                    () = self.cancel.cancelled() => return None,
                    result = &mut connecting => break result,
                    msg = self.outgoing.recv() => match msg {
                        Some(text) => self.emit(ClientEvent::DeliveryFailed { text }).await,
                        None => return None,
                    },
                }
            };
            match result {
                Ok(stream) => {
                    info!(attempt, "reconnected");
                    return Some(stream);
                }
                Err(e) => {
                    debug!(error = %e, attempt, "reconnect attempt failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn set_state(&mut self, state: ConnectionState) {
        let _ = self.state.send(state);
        self.emit(ClientEvent::State(state)).await;
    }

    async fn emit(&self, event: ClientEvent) {
        // The receiver being gone just means nobody is rendering.
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(25);
    const GUARD: Duration = Duration::from_secs(5);

    fn fast_policy() -> Arc<dyn ReconnectPolicy> {
        Arc::new(FixedDelay::new(TICK))
    }

    async fn listen() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn accept_and_read_hello(listener: &TcpListener) -> (TcpStream, String) {
        let (stream, _) = timeout(GUARD, listener.accept()).await.unwrap().unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let _ = timeout(GUARD, reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        (reader.into_inner(), line)
    }

    #[tokio::test]
    async fn connect_sends_hello_first() {
        let (listener, port) = listen().await;
        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"));

        let accept = tokio::spawn(async move { accept_and_read_hello(&listener).await });
        let handle = connector.connect().await.unwrap();
        let (_stream, line) = accept.await.unwrap();

        assert_eq!(line, "{\"type\":\"hello\",\"name\":\"alice\"}\n");
        assert_eq!(handle.state(), ConnectionState::Connected);
        handle.close();
        handle.closed().await;
    }

    #[tokio::test]
    async fn initial_connect_failure_is_an_error() {
        // Bind then drop to get a port with nothing listening.
        let (listener, port) = listen().await;
        drop(listener);

        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[tokio::test]
    async fn server_frames_become_events() {
        let (listener, port) = listen().await;
        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"));

        let accept = tokio::spawn(async move { accept_and_read_hello(&listener).await });
        let mut handle = connector.connect().await.unwrap();
        let (mut stream, _) = accept.await.unwrap();

        stream
            .write_all(b"{\"type\":\"presence\",\"names\":[\"alice\"]}\n")
            .await
            .unwrap();

        // First event is the initial Connected state change.
        let first = timeout(GUARD, handle.next_event()).await.unwrap().unwrap();
        assert_eq!(first, ClientEvent::State(ConnectionState::Connected));
        let second = timeout(GUARD, handle.next_event()).await.unwrap().unwrap();
        assert_eq!(
            second,
            ClientEvent::Presence {
                names: vec!["alice".into()]
            }
        );
        handle.close();
        handle.closed().await;
    }

    #[tokio::test]
    async fn lost_connection_reconnects_and_resends_hello() {
        let (listener, port) = listen().await;
        let connector =
            Connector::new(ClientConfig::new("127.0.0.1", port, "alice")).with_policy(fast_policy());

        let accept = tokio::spawn(async move {
            let (stream, _) = accept_and_read_hello(&listener).await;
            drop(stream); // kill the first connection
            accept_and_read_hello(&listener).await
        });
        let mut handle = connector.connect().await.unwrap();

        // The second accept only resolves if the client reconnected and
        // resent its hello.
        let (_stream, line) = accept.await.unwrap();
        assert_eq!(line, "{\"type\":\"hello\",\"name\":\"alice\"}\n");

        // Observed states: Connected, Reconnecting, Connected.
        let mut states = Vec::new();
        while states.len() < 3 {
            match timeout(GUARD, handle.next_event()).await.unwrap().unwrap() {
                ClientEvent::State(s) => states.push(s),
                _ => {}
            }
        }
        assert_eq!(
            states,
            vec![
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Connected,
            ]
        );
        handle.close();
        handle.closed().await;
    }

    #[tokio::test]
    async fn send_while_reconnecting_reports_delivery_failed() {
        let (listener, port) = listen().await;
        // Long delay keeps the client in Reconnecting while we poke it.
        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"))
            .with_policy(Arc::new(FixedDelay::new(Duration::from_secs(60))));

        let accept = tokio::spawn(async move { accept_and_read_hello(&listener).await });
        let mut handle = connector.connect().await.unwrap();
        let (stream, _) = accept.await.unwrap();
        drop(stream);

        // Wait until the driver has noticed the loss.
        let mut state_changes = handle.state_changes();
        timeout(GUARD, async {
            while *state_changes.borrow_and_update() != ConnectionState::Reconnecting {
                state_changes.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        handle.send("hello?").await.unwrap();
        let event = timeout(GUARD, async {
            loop {
                match handle.next_event().await.unwrap() {
                    ClientEvent::DeliveryFailed { text } => break text,
                    _ => {}
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event, "hello?");
        handle.close();
        handle.closed().await;
    }

    #[tokio::test]
    async fn close_is_terminal_from_reconnecting() {
        let (listener, port) = listen().await;
        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"))
            .with_policy(Arc::new(FixedDelay::new(Duration::from_secs(60))));

        let accept = tokio::spawn(async move { accept_and_read_hello(&listener).await });
        let handle = connector.connect().await.unwrap();
        let (stream, _) = accept.await.unwrap();
        drop(stream);

        let mut state_changes = handle.state_changes();
        handle.close();
        timeout(GUARD, async {
            while *state_changes.borrow_and_update() != ConnectionState::Disconnected {
                state_changes.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        handle.closed().await;
    }

    #[tokio::test]
    async fn sends_during_reconnect_attempts_are_not_buffered() {
        let (listener, port) = listen().await;
        // Near-zero delay keeps the retry loop mostly inside an attempt.
        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"))
            .with_policy(Arc::new(FixedDelay::new(Duration::from_millis(1))));

        let accept = tokio::spawn(async move { accept_and_read_hello(&listener).await });
        let mut handle = connector.connect().await.unwrap();
        let (stream, _) = accept.await.unwrap();
        // The listener died with the accept task; dropping the socket leaves
        // nothing on the port and every attempt fails.
        drop(stream);

        let mut state_changes = handle.state_changes();
        timeout(GUARD, async {
            while *state_changes.borrow_and_update() != ConnectionState::Reconnecting {
                state_changes.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        // Whichever phase of the retry loop this lands in, the message must
        // be consumed and reported, never queued for the next connection.
        handle.send("stale").await.unwrap();
        let failed = timeout(GUARD, async {
            loop {
                match handle.next_event().await.unwrap() {
                    ClientEvent::DeliveryFailed { text } => break text,
                    _ => {}
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(failed, "stale");

        // Bring the port back; the fresh connection sees hello and nothing
        // else.
        let listener = timeout(GUARD, async {
            loop {
                match TcpListener::bind(("127.0.0.1", port)).await {
                    Ok(l) => break l,
                    Err(_) => tokio::time::sleep(TICK).await,
                }
            }
        })
        .await
        .unwrap();
        let (stream, line) = accept_and_read_hello(&listener).await;
        assert_eq!(line, "{\"type\":\"hello\",\"name\":\"alice\"}\n");

        let mut reader = BufReader::new(stream);
        let mut extra = String::new();
        let read = timeout(Duration::from_millis(300), reader.read_line(&mut extra)).await;
        assert!(read.is_err(), "unexpected frame after reconnect: {extra:?}");

        handle.close();
        handle.closed().await;
    }

    #[tokio::test]
    async fn close_during_failing_attempts_exits_promptly() {
        let (listener, port) = listen().await;
        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"))
            .with_policy(Arc::new(FixedDelay::new(Duration::from_millis(1))));

        let accept = tokio::spawn(async move { accept_and_read_hello(&listener).await });
        let handle = connector.connect().await.unwrap();
        let (stream, _) = accept.await.unwrap();
        drop(stream);

        // Let the retry loop get going, then close; the machine must exit
        // without waiting for any attempt to resolve.
        tokio::time::sleep(TICK).await;
        handle.close();
        timeout(GUARD, handle.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (listener, port) = listen().await;
        let connector = Connector::new(ClientConfig::new("127.0.0.1", port, "alice"));

        let accept = tokio::spawn(async move { accept_and_read_hello(&listener).await });
        let handle = connector.connect().await.unwrap();
        let _ = accept.await.unwrap();

        handle.close();
        // The driver drops the outgoing receiver on exit.
        let result = timeout(GUARD, async {
            loop {
                if handle.send("too late").await.is_err() {
                    break;
                }
                tokio::time::sleep(TICK).await;
            }
        })
        .await;
        assert!(result.is_ok());
        handle.closed().await;
    }
}
