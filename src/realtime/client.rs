//! Acknowledgement-correlating event client
//!
//! [`EventClient`] is decoupled from the socket: it writes serialized frames
//! to an outbound channel and is fed inbound frames by [`start_read_loop`].
//!
//! - Every emitted event gets a fresh `ack` number and a slot in the
//!   `pending` map. The read loop resolves the slot when the matching
//!   acknowledgement arrives.
//! - Server events are handed to the `on_event` callback in arrival order.
//! - When the loop stops (cancellation or closed inbound channel) every
//!   pending slot is dropped, so in-flight callers fail immediately instead
//!   of waiting for their timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};
use crate::realtime::protocol::{parse_inbound, ClientFrame, InboundFrame, ServerEvent};

/// Callback invoked for every server event.
pub type EventHandler = Arc<dyn Fn(ServerEvent) + Send + Sync + 'static>;

type PendingMap = HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>;

/// Channel-backed client for the realtime event protocol.
pub struct EventClient {
    next_ack: AtomicU64,
    pending: Mutex<PendingMap>,
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl std::fmt::Debug for EventClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventClient")
            .field("next_ack", &self.next_ack.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventClient {
    /// Create a client writing frames to `outbound_tx`.
    pub fn new(outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_ack: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound_tx,
        }
    }

    /// Emit `event` and wait up to `timeout` for its acknowledgement.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Transport`] if the connection is closed before or
    ///   while waiting.
    /// - [`ChatError::AckTimeout`] if no acknowledgement arrives in time.
    /// - [`ChatError::Rejected`] if the server acknowledges with an error.
    pub async fn emit_with_ack<P, R>(&self, event: &str, data: P, timeout: Duration) -> Result<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let ack = self.next_ack.fetch_add(1, Ordering::SeqCst);

        // Register before sending so a fast reply always finds its slot.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(ack, tx);

        let frame = serde_json::to_string(&ClientFrame {
            event: event.to_string(),
            ack: Some(ack),
            data: serde_json::to_value(data)?,
        })?;
        tracing::debug!(event, ack, "Emitting realtime event");

        if self.outbound_tx.send(frame).is_err() {
            self.pending.lock().await.remove(&ack);
            return Err(ChatError::Transport("connection closed".to_string()).into());
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.lock().await.remove(&ack);
                return Err(ChatError::AckTimeout {
                    event: event.to_string(),
                }
                .into());
            }
        };

        let reply = outcome.map_err(|_| {
            ChatError::Transport("connection closed before acknowledgement".to_string())
        })?;

        let value = reply.map_err(|message| ChatError::Rejected {
            event: event.to_string(),
            message,
        })?;

        Ok(serde_json::from_value(value).map_err(ChatError::Serialization)?)
    }

    /// Number of emitted events still waiting for an acknowledgement.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn resolve(&self, ack: u64, outcome: std::result::Result<Value, String>) {
        let Some(tx) = self.pending.lock().await.remove(&ack) else {
            tracing::debug!(ack, "Acknowledgement for unknown or expired event; ignoring");
            return;
        };
        // The caller may already have timed out.
        let _ = tx.send(outcome);
    }
}

/// Spawn the task that consumes inbound frames for `client`.
///
/// The loop ends when `cancellation` fires or `inbound_rx` closes. In the
/// latter case `cancellation` is cancelled too, so the owner of the
/// connection can observe that it went down.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: Arc<EventClient>,
    on_event: EventHandler,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                maybe_frame = inbound_rx.recv() => {
                    let Some(raw) = maybe_frame else {
                        tracing::info!("Realtime connection closed by peer");
                        cancellation.cancel();
                        break;
                    };
                    dispatch_frame(&raw, &client, &on_event).await;
                }
            }
        }

        client.pending.lock().await.clear();
    })
}

async fn dispatch_frame(raw: &str, client: &EventClient, on_event: &EventHandler) {
    match parse_inbound(raw) {
        Ok(InboundFrame::Ack { ack, outcome }) => client.resolve(ack, outcome).await,
        Ok(InboundFrame::Event(event)) => on_event(event),
        Ok(InboundFrame::Unknown(name)) => {
            tracing::debug!(event = %name, "Ignoring unhandled realtime event");
        }
        Err(e) => tracing::warn!("Ignoring malformed realtime frame: {e}"),
    }
}
