//! Chat synchronization client
//!
//! [`ChatClient`] wires the directory, transport, message store and
//! read-state reconciler together:
//!
//! 1. the directory picks the active conversation,
//! 2. the store is hydrated from history,
//! 3. live events from the transport update the store and counters,
//! 4. the view is rebuilt from the result.
//!
//! All state lives in the client and changes through `&mut self`. Transport
//! listeners only forward events into an inbox; the owner drains it with
//! [`ChatClient::next_event`] / [`ChatClient::handle_event`] (or
//! [`ChatClient::drain_events`]). Listener subscriptions are replaced on
//! every activation, so handlers never pile up across conversation
//! switches.
//!
//! History loads are split into [`ChatClient::begin_activation`] and
//! [`ChatClient::complete_activation`] so a caller can fetch concurrently;
//! a completion whose activation has been superseded is discarded.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::ApiClient;
use crate::directory::{ConversationDirectory, ConversationState};
use crate::error::{ChatError, Result};
use crate::models::{ChatBox, ConversationTarget, Message, MessageId, User, UserId};
use crate::realtime::ServerEvent;
use crate::reconciler::ReadStateReconciler;
use crate::session::SessionContext;
use crate::store::MessageStore;
use crate::transport::{ChatTransport, Subscription};
use crate::view::ConversationView;

/// Proof of a started activation, handed back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationTicket {
    pub generation: u64,
    pub target: ConversationTarget,
}

/// Result of completing an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// History applied; unread messages acknowledged.
    Applied,
    /// History could not be loaded; the conversation is shown empty.
    Failed(String),
    /// A newer activation started meanwhile; nothing changed.
    Stale,
}

/// Effect of one live event on local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// Message added to the active conversation.
    Appended(MessageId),
    /// Message held until the loading conversation is ready.
    Buffered(MessageId),
    /// Message for another conversation; counter for `counterpart` is now `count`.
    Unread { counterpart: UserId, count: u32 },
    /// Read flag set on a stored message.
    Read(MessageId),
    /// Duplicate or irrelevant event.
    Ignored,
}

pub struct ChatClient {
    session: SessionContext,
    transport: Arc<ChatTransport>,
    directory: ConversationDirectory,
    store: MessageStore,
    reconciler: ReadStateReconciler,
    me: Option<User>,
    inbox_tx: mpsc::UnboundedSender<ServerEvent>,
    inbox_rx: mpsc::UnboundedReceiver<ServerEvent>,
    subscriptions: Vec<Subscription>,
    buffered: Vec<Message>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", self.directory.state())
            .field("messages", &self.store.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(session: SessionContext, transport: Arc<ChatTransport>) -> Self {
        let directory = ConversationDirectory::new(session.clone(), Arc::clone(transport.api()));
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            session,
            transport,
            directory,
            store: MessageStore::new(),
            reconciler: ReadStateReconciler::new(),
            me: None,
            inbox_tx,
            inbox_rx,
            subscriptions: Vec::new(),
            buffered: Vec::new(),
        }
    }

    /// Connect, load the directory and seed unread counters.
    ///
    /// A failed realtime connection is not an error: the client keeps
    /// working over HTTP and [`ChatClient::reconnect`] can be retried later.
    ///
    /// # Errors
    ///
    /// Fails when nobody is signed in.
    pub async fn start(&mut self) -> Result<()> {
        let me = self.session.require_user().await?;
        self.me = Some(me.clone());
        self.resubscribe();

        if let Err(e) = self.transport.connect().await {
            tracing::warn!("Realtime unavailable, continuing over HTTP: {e}");
        }

        self.directory.refresh().await?;

        match self.transport.api().unread_messages().await {
            Ok(unread) => self.reconciler.seed(&unread, me.user_id),
            Err(e) => tracing::warn!("Failed to load unread messages: {e}"),
        }

        tracing::info!(
            user_id = me.user_id,
            unread = self.reconciler.total(),
            "Chat client started"
        );
        Ok(())
    }

    /// Drop listeners and the live connection.
    pub async fn stop(&mut self) {
        self.subscriptions.clear();
        self.transport.disconnect().await;
    }

    /// Re-establish the live connection with the session's credential.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.transport.reconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    fn me(&self) -> Result<UserId> {
        self.me.as_ref().map(|u| u.user_id).ok_or_else(|| {
            ChatError::MissingCredentials("chat client not started".to_string()).into()
        })
    }

    /// Register fresh listeners, then release the previous ones.
    fn resubscribe(&mut self) {
        let messages = self.inbox_tx.clone();
        let reads = self.inbox_tx.clone();
        let fresh = vec![
            self.transport.on_message_arrived(move |message| {
                let _ = messages.send(ServerEvent::NewMessage(message.clone()));
            }),
            self.transport.on_read_acknowledged(move |receipt| {
                let _ = reads.send(ServerEvent::MessageRead(*receipt));
            }),
        ];
        // Old handles drop here; a duplicate delivery in between is harmless.
        self.subscriptions = fresh;
    }

    // -----------------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------------

    /// Switch to `target` and enter `Loading`.
    ///
    /// The store is emptied immediately; live messages for `target` that
    /// arrive before completion are held and merged into the history.
    pub fn begin_activation(&mut self, target: ConversationTarget) -> ActivationTicket {
        self.resubscribe();
        self.store.clear();
        self.buffered.clear();
        let generation = self.directory.begin_loading(target);
        ActivationTicket { generation, target }
    }

    /// History for `target` from the backend.
    pub async fn fetch_history(api: &ApiClient, target: ConversationTarget) -> Result<Vec<Message>> {
        match target {
            ConversationTarget::Direct(counterpart) => api.messages_with(counterpart).await,
            ConversationTarget::Container(chat_box) => api.messages_in_box(chat_box).await,
        }
    }

    /// REST client, for fetching history outside of `&mut self`.
    pub fn api(&self) -> Arc<ApiClient> {
        Arc::clone(self.transport.api())
    }

    /// Apply the history fetched for `ticket`.
    ///
    /// On success the store is hydrated, unread inbound messages are marked
    /// read and acknowledged, and the counterpart's counter is reset. On
    /// failure the conversation becomes ready with an empty log and a
    /// notice. Either way the directory leaves `Loading`.
    pub async fn complete_activation(
        &mut self,
        ticket: ActivationTicket,
        history: Result<Vec<Message>>,
    ) -> Result<ActivationOutcome> {
        if !self.directory.is_current(ticket.generation) {
            tracing::warn!(conversation = %ticket.target, "Discarding history for a superseded conversation");
            return Ok(ActivationOutcome::Stale);
        }
        let me = match self.me() {
            Ok(me) => me,
            Err(e) => {
                self.buffered.clear();
                self.directory
                    .finish_loading(ticket.generation, Some(format!("Could not load conversation: {}", e)));
                return Err(e);
            }
        };

        match history {
            Ok(messages) => {
                self.store.hydrate(messages);
                for message in std::mem::take(&mut self.buffered) {
                    self.store.append(message);
                }
                self.directory.finish_loading(ticket.generation, None);
                self.acknowledge_unread(me).await;
                match self.directory.resolve_counterpart(ticket.target, me).await {
                    Ok(Some(counterpart)) => self.reconciler.clear(counterpart),
                    Ok(None) => {
                        tracing::warn!(conversation = %ticket.target, "Signed-in user is not part of this conversation")
                    }
                    Err(e) => {
                        // Fall back to whoever wrote to us in this conversation.
                        tracing::warn!(conversation = %ticket.target, "Failed to look up conversation: {e}");
                        let senders: Vec<UserId> = self
                            .store
                            .messages()
                            .iter()
                            .filter(|m| !m.is_from(me))
                            .map(|m| m.sender.user_id)
                            .collect();
                        for sender in senders {
                            self.reconciler.clear(sender);
                        }
                    }
                }
                tracing::info!(conversation = %ticket.target, messages = self.store.len(), "Conversation ready");
                Ok(ActivationOutcome::Applied)
            }
            Err(e) => {
                tracing::warn!(conversation = %ticket.target, "Failed to load conversation: {e}");
                let notice = format!("Could not load conversation: {}", e);
                self.store.clear();
                for message in std::mem::take(&mut self.buffered) {
                    self.reconciler.record_arrival(&message, me);
                }
                self.directory.finish_loading(ticket.generation, Some(notice.clone()));
                Ok(ActivationOutcome::Failed(notice))
            }
        }
    }

    /// Activate `target`: begin, fetch and complete in one call.
    pub async fn activate(&mut self, target: ConversationTarget) -> Result<ActivationOutcome> {
        let ticket = self.begin_activation(target);
        let api = self.api();
        let history = Self::fetch_history(&api, target).await;
        self.complete_activation(ticket, history).await
    }

    /// Look up or create the container shared with `counterpart` and
    /// activate it.
    pub async fn open_container(&mut self, counterpart: UserId) -> Result<(ChatBox, ActivationOutcome)> {
        let chat_box = self.directory.ensure_container(counterpart).await?;
        let outcome = self.activate(ConversationTarget::Container(chat_box.id)).await?;
        Ok((chat_box, outcome))
    }

    async fn acknowledge_unread(&mut self, me: UserId) {
        let ids = self.reconciler.take_unacknowledged(&mut self.store, me);
        for id in ids {
            // The local flag stays set even if the server call fails.
            if let Err(e) = self.transport.acknowledge_read(id).await {
                tracing::warn!(message_id = id, "Read acknowledgement failed: {e}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Live events
    // -----------------------------------------------------------------------

    /// Wait for the next live event.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.inbox_rx.recv().await
    }

    /// Apply one live event.
    pub async fn handle_event(&mut self, event: ServerEvent) -> Result<SyncUpdate> {
        let me = self.me()?;
        match event {
            ServerEvent::NewMessage(message) => Ok(self.apply_message(message, me).await),
            ServerEvent::MessageRead(receipt) => {
                if self.store.mark_read(receipt.message_id) {
                    Ok(SyncUpdate::Read(receipt.message_id))
                } else {
                    Ok(SyncUpdate::Ignored)
                }
            }
        }
    }

    async fn apply_message(&mut self, message: Message, me: UserId) -> SyncUpdate {
        let id = message.id;
        match self.directory.state().clone() {
            ConversationState::Ready { target, .. } if target.includes(&message, me) => {
                let inbound_unread = !message.is_from(me) && !message.is_read;
                if !self.store.append(message) {
                    return SyncUpdate::Ignored;
                }
                if inbound_unread {
                    self.acknowledge_unread(me).await;
                }
                SyncUpdate::Appended(id)
            }
            ConversationState::Loading { target } if target.includes(&message, me) => {
                if self.buffered.iter().any(|m| m.id == id) {
                    return SyncUpdate::Ignored;
                }
                self.buffered.push(message);
                SyncUpdate::Buffered(id)
            }
            _ => {
                let counterpart = message.sender.user_id;
                if self.reconciler.record_arrival(&message, me) {
                    SyncUpdate::Unread {
                        counterpart,
                        count: self.reconciler.unread_count(counterpart),
                    }
                } else {
                    SyncUpdate::Ignored
                }
            }
        }
    }

    /// Apply every event already waiting in the inbox.
    pub async fn drain_events(&mut self) -> Result<Vec<SyncUpdate>> {
        let mut updates = Vec::new();
        while let Ok(event) = self.inbox_rx.try_recv() {
            updates.push(self.handle_event(event).await?);
        }
        Ok(updates)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send `content` to the active conversation.
    ///
    /// The message enters the store only after the transport confirms it; a
    /// failed send leaves the store untouched.
    ///
    /// # Errors
    ///
    /// [`ChatError::Validation`] for blank content,
    /// [`ChatError::NoActiveConversation`] when nothing is selected, or the
    /// transport's error.
    pub async fn send(&mut self, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(ChatError::Validation("message is empty".to_string()).into());
        }
        let target = self
            .directory
            .active()
            .ok_or(ChatError::NoActiveConversation)?;

        let message = self.transport.send(target, content).await?;
        tracing::debug!(message_id = message.id, conversation = %target, "Message sent");

        if self.directory.active() == Some(target) {
            if self.directory.state().is_loading() {
                if !self.buffered.iter().any(|m| m.id == message.id) {
                    self.buffered.push(message.clone());
                }
            } else {
                self.store.append(message.clone());
            }
        }
        Ok(message)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn current_user(&self) -> Option<&User> {
        self.me.as_ref()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn reconciler(&self) -> &ReadStateReconciler {
        &self.reconciler
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut ConversationDirectory {
        &mut self.directory
    }

    pub fn transport(&self) -> &Arc<ChatTransport> {
        &self.transport
    }

    pub fn state(&self) -> &ConversationState {
        self.directory.state()
    }

    pub fn unread_count(&self, counterpart: UserId) -> u32 {
        self.reconciler.unread_count(counterpart)
    }

    /// Presentation projection of the current state.
    pub fn view(&self) -> ConversationView {
        let me = self.me.as_ref().map(|u| u.user_id).unwrap_or_default();
        ConversationView::from_parts(&self.store, &self.directory, &self.reconciler, me)
    }
}
