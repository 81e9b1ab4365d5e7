//! Transport adapter
//!
//! [`ChatTransport`] owns at most one live realtime connection per session
//! and exposes the two write operations of the chat core, `send` and
//! `acknowledge_read`. Each is attempted over the live connection when one
//! exists at call time and falls back to the REST endpoint otherwise. There
//! is no retry: a failed call is returned to the caller as is.
//!
//! Server events are fanned out to listeners registered with
//! [`ChatTransport::on_message_arrived`] and
//! [`ChatTransport::on_read_acknowledged`]. Registration returns a
//! [`Subscription`]; dropping it (or passing it to
//! [`ChatTransport::remove_listener`]) unregisters the handler.
//!
//! Reconnection is manual. When the connection drops, live delivery stops
//! and writes go over REST until [`ChatTransport::reconnect`] is called.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::config::{RealtimeConfig, ServerConfig};
use crate::error::Result;
use crate::models::{ConversationTarget, Message, MessageId, ReadReceipt};
use crate::realtime::protocol::{MarkAsReadPayload, SendMessagePayload, MARK_AS_READ, SEND_MESSAGE};
use crate::realtime::{start_read_loop, Connector, EventClient, ServerEvent};
use crate::session::SessionContext;

type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync + 'static>;
type ReadHandler = Arc<dyn Fn(&ReadReceipt) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    MessageArrived,
    ReadAcknowledged,
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: AtomicU64,
    messages: Mutex<BTreeMap<u64, MessageHandler>>,
    reads: Mutex<BTreeMap<u64, ReadHandler>>,
}

impl ListenerRegistry {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn remove(&self, kind: ListenerKind, id: u64) {
        match kind {
            ListenerKind::MessageArrived => {
                lock(&self.messages).remove(&id);
            }
            ListenerKind::ReadAcknowledged => {
                lock(&self.reads).remove(&id);
            }
        }
    }

    fn count(&self) -> usize {
        lock(&self.messages).len() + lock(&self.reads).len()
    }

    fn dispatch(&self, event: ServerEvent) {
        // Handlers are cloned out so they may (un)subscribe without deadlock.
        match event {
            ServerEvent::NewMessage(message) => {
                tracing::debug!(message_id = message.id, "newMessage received");
                let handlers: Vec<MessageHandler> = lock(&self.messages).values().cloned().collect();
                for handler in handlers {
                    handler(&message);
                }
            }
            ServerEvent::MessageRead(receipt) => {
                tracing::debug!(message_id = receipt.message_id, read_by = receipt.read_by, "messageRead received");
                let handlers: Vec<ReadHandler> = lock(&self.reads).values().cloned().collect();
                for handler in handlers {
                    handler(&receipt);
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration handle for a transport listener.
///
/// The listener stays registered for as long as the handle is alive.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    kind: ListenerKind,
    registry: Weak<ListenerRegistry>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

struct LiveConnection {
    client: Arc<EventClient>,
    shutdown: CancellationToken,
    read_loop: tokio::task::JoinHandle<()>,
}

impl LiveConnection {
    fn is_alive(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.read_loop.is_finished()
    }
}

/// Live-first, REST-fallback transport shared by every conversation of a
/// session.
pub struct ChatTransport {
    server: ServerConfig,
    realtime: RealtimeConfig,
    session: SessionContext,
    api: Arc<ApiClient>,
    connector: Arc<dyn Connector>,
    live: AsyncMutex<Option<LiveConnection>>,
    listeners: Arc<ListenerRegistry>,
}

impl std::fmt::Debug for ChatTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTransport")
            .field("socket_url", &self.server.resolved_socket_url())
            .field("realtime_enabled", &self.realtime.enabled)
            .field("listeners", &self.listeners.count())
            .finish_non_exhaustive()
    }
}

impl ChatTransport {
    pub fn new(
        server: ServerConfig,
        realtime: RealtimeConfig,
        session: SessionContext,
        api: Arc<ApiClient>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            server,
            realtime,
            session,
            api,
            connector,
            live: AsyncMutex::new(None),
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    /// REST client used for fallbacks and history.
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// Open the live connection.
    ///
    /// Does nothing when a live connection already exists, when realtime is
    /// disabled in configuration, or when the session holds no credential.
    ///
    /// # Errors
    ///
    /// Returns the connector's error when the connection attempt fails.
    pub async fn connect(&self) -> Result<()> {
        if !self.realtime.enabled {
            tracing::debug!("Realtime disabled; using HTTP only");
            return Ok(());
        }
        let Some(token) = self.session.credential().await else {
            tracing::debug!("No credential in session; skipping realtime connection");
            return Ok(());
        };

        let mut live = self.live.lock().await;
        if live.as_ref().is_some_and(LiveConnection::is_alive) {
            return Ok(());
        }

        let url = self.server.resolved_socket_url();
        let connection = self.connector.connect(&url, &token).await?;

        let client = Arc::new(EventClient::new(connection.outbound_tx));
        let registry = Arc::clone(&self.listeners);
        let read_loop = start_read_loop(
            connection.inbound_rx,
            connection.shutdown.clone(),
            Arc::clone(&client),
            Arc::new(move |event| registry.dispatch(event)),
        );

        *live = Some(LiveConnection {
            client,
            shutdown: connection.shutdown,
            read_loop,
        });
        tracing::info!(url = %url, "Realtime channel connected");
        Ok(())
    }

    /// Close the live connection, if any.
    pub async fn disconnect(&self) {
        if let Some(connection) = self.live.lock().await.take() {
            connection.shutdown.cancel();
            tracing::info!("Realtime channel disconnected");
        }
    }

    /// Tear down any existing connection and open a fresh one with the
    /// credential currently in the session.
    pub async fn reconnect(&self) -> Result<()> {
        tracing::info!("Reconnecting realtime channel");
        self.disconnect().await;
        self.connect().await
    }

    /// Whether a live connection is currently up.
    pub async fn is_connected(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .is_some_and(LiveConnection::is_alive)
    }

    async fn live_client(&self) -> Option<Arc<EventClient>> {
        let mut live = self.live.lock().await;
        match live.as_ref() {
            Some(connection) if connection.is_alive() => Some(Arc::clone(&connection.client)),
            Some(_) => {
                tracing::warn!("Realtime connection lost; falling back to HTTP until reconnect");
                *live = None;
                None
            }
            None => None,
        }
    }

    /// Send `content` to `target`.
    ///
    /// # Errors
    ///
    /// Propagates the live or REST failure; nothing is retried.
    pub async fn send(&self, target: ConversationTarget, content: &str) -> Result<Message> {
        if let Some(client) = self.live_client().await {
            return client
                .emit_with_ack(
                    SEND_MESSAGE,
                    SendMessagePayload::new(target, content),
                    self.realtime.ack_timeout(),
                )
                .await;
        }

        tracing::debug!(conversation = %target, "Sending over HTTP");
        match target {
            ConversationTarget::Direct(receiver) => self.api.send_message(receiver, content).await,
            ConversationTarget::Container(chat_box) => {
                self.api.send_to_box(chat_box, content).await
            }
        }
    }

    /// Mark `message_id` read on the server.
    ///
    /// # Errors
    ///
    /// Propagates the live or REST failure; nothing is retried.
    pub async fn acknowledge_read(&self, message_id: MessageId) -> Result<Message> {
        if let Some(client) = self.live_client().await {
            return client
                .emit_with_ack(
                    MARK_AS_READ,
                    MarkAsReadPayload { message_id },
                    self.realtime.ack_timeout(),
                )
                .await;
        }

        tracing::debug!(message_id, "Acknowledging read over HTTP");
        self.api.mark_read(message_id).await
    }

    /// Register `handler` for every `newMessage` event.
    pub fn on_message_arrived<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id();
        lock(&self.listeners.messages).insert(id, Arc::new(handler));
        self.subscription(ListenerKind::MessageArrived, id)
    }

    /// Register `handler` for every `messageRead` event.
    pub fn on_read_acknowledged<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ReadReceipt) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id();
        lock(&self.listeners.reads).insert(id, Arc::new(handler));
        self.subscription(ListenerKind::ReadAcknowledged, id)
    }

    /// Unregister the listener behind `subscription`.
    pub fn remove_listener(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Number of registered listeners of either kind.
    pub fn listener_count(&self) -> usize {
        self.listeners.count()
    }

    fn subscription(&self, kind: ListenerKind, id: u64) -> Subscription {
        Subscription {
            id,
            kind,
            registry: Arc::downgrade(&self.listeners),
        }
    }
}
