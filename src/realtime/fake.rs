//! In-process fake realtime server for unit and integration tests
//!
//! [`FakeConnector::new`] returns a `(FakeConnector, FakeServer)` pair. Wire
//! the connector into the code under test; every successful `connect`
//! produces a [`FakeSocket`] that the test picks up with
//! [`FakeServer::accept`].
//!
//! From the test side a [`FakeSocket`] can:
//!
//! - read what the client emitted: [`FakeSocket::next_frame`]
//! - acknowledge an emitted event: [`FakeSocket::reply`] /
//!   [`FakeSocket::reply_error`]
//! - push server events: [`FakeSocket::emit`]
//! - drop the connection: [`FakeSocket::disconnect`]
//!
//! For tests that only need a cooperative server,
//! [`FakeSocket::spawn_responder`] acknowledges every frame from a closure
//! on a background task.
//!
//! ```text
//! client emit ----> outbound_tx ----> FakeSocket::next_frame
//! FakeSocket::emit/reply ----> inbound_tx ----> client read loop
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};
use crate::realtime::protocol::ClientFrame;
use crate::realtime::{Connection, Connector};

#[derive(Debug)]
struct FakeState {
    available: AtomicBool,
    connects: AtomicUsize,
    tokens: Mutex<Vec<String>>,
    accept_tx: mpsc::UnboundedSender<FakeSocket>,
}

/// In-process [`Connector`] for tests.
#[derive(Debug, Clone)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

/// Test-side end of a [`FakeConnector`]; yields one [`FakeSocket`] per
/// accepted connection.
#[derive(Debug)]
pub struct FakeServer {
    accept_rx: mpsc::UnboundedReceiver<FakeSocket>,
}

impl FakeConnector {
    /// Create a connector and the server handle that observes it.
    pub fn new() -> (Self, FakeServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(FakeState {
                available: AtomicBool::new(true),
                connects: AtomicUsize::new(0),
                tokens: Mutex::new(Vec::new()),
                accept_tx,
            }),
        };
        (connector, FakeServer { accept_rx })
    }

    /// When `false`, every `connect` fails as if the server were down.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful connections so far.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Bearer tokens presented by each connection attempt, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.state
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str, token: &str) -> Result<Connection> {
        self.state
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token.to_string());

        if !self.state.available.load(Ordering::SeqCst) {
            return Err(ChatError::Transport(format!("connection to {} refused", url)).into());
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();

        let socket = FakeSocket {
            url: url.to_string(),
            token: token.to_string(),
            outbound_rx,
            inbound_tx,
            shutdown: shutdown.clone(),
        };
        self.state
            .accept_tx
            .send(socket)
            .map_err(|_| ChatError::Transport("fake server dropped".to_string()))?;
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Connection {
            outbound_tx,
            inbound_rx,
            shutdown,
        })
    }
}

impl FakeServer {
    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> Option<FakeSocket> {
        self.accept_rx.recv().await
    }

    /// The next accepted connection, if one is already waiting.
    pub fn try_accept(&mut self) -> Option<FakeSocket> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server side of one fake connection.
#[derive(Debug)]
pub struct FakeSocket {
    pub url: String,
    pub token: String,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl FakeSocket {
    /// Next frame emitted by the client, `None` once the client hung up.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        loop {
            let raw = self.outbound_rx.recv().await?;
            match serde_json::from_str(&raw) {
                Ok(frame) => return Some(frame),
                Err(e) => tracing::warn!("Fake server ignoring unparsable frame: {e}"),
            }
        }
    }

    /// Acknowledge event `ack` with `data`.
    pub fn reply(&self, ack: u64, data: Value) {
        self.push(json!({ "ack": ack, "data": data }));
    }

    /// Acknowledge event `ack` with an error.
    pub fn reply_error(&self, ack: u64, message: &str) {
        self.push(json!({ "ack": ack, "error": message }));
    }

    /// Push a server event.
    pub fn emit(&self, event: &str, data: Value) {
        self.push(json!({ "event": event, "data": data }));
    }

    /// Whether the client side closed the connection.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Drop the connection from the server side.
    pub fn disconnect(self) {
        self.shutdown.cancel();
    }

    fn push(&self, frame: Value) {
        if self.inbound_tx.send(frame.to_string()).is_err() {
            tracing::debug!("Fake server push after client went away");
        }
    }

    /// Acknowledge every client frame on a background task using `respond`.
    ///
    /// `respond` returns the acknowledgement payload, or `Err(text)` to
    /// reject the event.
    pub fn spawn_responder<F>(self, respond: F) -> FakeResponder
    where
        F: Fn(&ClientFrame) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let received = Arc::new(Mutex::new(Vec::new()));
        let pusher = self.inbound_tx.clone();
        let shutdown = self.shutdown.clone();
        let log = Arc::clone(&received);
        let stop = self.shutdown.clone();
        let mut socket = self;

        let task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = stop.cancelled() => break,
                    frame = socket.next_frame() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let reply = respond(&frame);
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(frame.clone());
                match (frame.ack, reply) {
                    (Some(ack), Ok(data)) => socket.reply(ack, data),
                    (Some(ack), Err(message)) => socket.reply_error(ack, &message),
                    (None, _) => {}
                }
            }
        });

        FakeResponder {
            pusher,
            received,
            shutdown,
            task,
        }
    }
}

/// Handle to a socket served by [`FakeSocket::spawn_responder`].
#[derive(Debug)]
pub struct FakeResponder {
    pusher: mpsc::UnboundedSender<String>,
    received: Arc<Mutex<Vec<ClientFrame>>>,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl FakeResponder {
    /// Push a server event.
    pub fn emit(&self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data });
        if self.pusher.send(frame.to_string()).is_err() {
            tracing::debug!("Fake server push after client went away");
        }
    }

    /// Frames received so far.
    pub fn received(&self) -> Vec<ClientFrame> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frames received so far for `event`.
    pub fn received_events(&self, event: &str) -> Vec<ClientFrame> {
        self.received()
            .into_iter()
            .filter(|f| f.event == event)
            .collect()
    }

    /// Whether the client side closed the connection.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Drop the connection from the server side.
    pub fn disconnect(self) {
        self.shutdown.cancel();
        self.task.abort();
    }
}
