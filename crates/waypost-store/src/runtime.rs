//! Async orchestration around the chat store.
//!
//! [`ChatRuntime`] drives the event loop: it dispatches view commands
//! into the store, executes the store's effects against the REST and
//! real-time collaborators on spawned tasks, feeds completions back in,
//! and publishes a fresh [`ChatSnapshot`] after every mutation.
//!
//! The runtime is generic over the transport seams so tests run it
//! against in-memory fakes with scripted outcomes.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use waypost_core::{ChatConfig, ChatError, ConversationId, ConversationKey, Counterpart, UserId};
use waypost_transport::{ChatApi, RealtimeChannel, TransportEvent};

use crate::effect::Effect;
use crate::event::StoreEvent;
use crate::state::ChatSnapshot;
use crate::store::ChatStore;

/// Commands views dispatch to the runtime.
#[derive(Debug, Clone)]
pub enum ChatCommand {
    /// Refresh the conversation list.
    LoadConversations,
    /// Open (or create) the conversation with a counterpart.
    OpenConversation(Counterpart),
    /// Send a message to the open conversation.
    SendMessage(String),
    /// Zero a conversation's unread count.
    MarkConversationRead(ConversationKey),
    /// Delete a conversation.
    DeleteConversation(ConversationId),
    /// Dismiss the current error.
    ClearError,
    /// Tear the session down.
    Shutdown,
}

/// Cloneable, view-facing surface of a chat session.
///
/// Views read snapshots and dispatch commands; they never touch store
/// state directly.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<ChatCommand>,
    snapshot: watch::Receiver<ChatSnapshot>,
}

impl ChatHandle {
    /// Current state snapshot.
    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot.clone()
    }

    /// Refresh the conversation list.
    pub async fn load_conversations(&self) -> Result<(), ChatError> {
        self.dispatch(ChatCommand::LoadConversations).await
    }

    /// Open the conversation with `counterpart`.
    pub async fn open_conversation(&self, counterpart: Counterpart) -> Result<(), ChatError> {
        self.dispatch(ChatCommand::OpenConversation(counterpart)).await
    }

    /// Send a message to the open conversation.
    ///
    /// Validation happens here, synchronously against the latest
    /// snapshot, so the composer gets immediate feedback before any
    /// network activity. Delivery failures surface later through the
    /// snapshot's error field.
    pub async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.snapshot.borrow().selected.is_none() {
            return Err(ChatError::NoActiveConversation);
        }
        self.dispatch(ChatCommand::SendMessage(text.to_owned())).await
    }

    /// Zero a conversation's unread count.
    pub async fn mark_conversation_read(&self, key: ConversationKey) -> Result<(), ChatError> {
        self.dispatch(ChatCommand::MarkConversationRead(key)).await
    }

    /// Delete a conversation.
    pub async fn delete_conversation(&self, id: ConversationId) -> Result<(), ChatError> {
        self.dispatch(ChatCommand::DeleteConversation(id)).await
    }

    /// Dismiss the current error.
    pub async fn clear_error(&self) -> Result<(), ChatError> {
        self.dispatch(ChatCommand::ClearError).await
    }

    /// Tear the session down.
    pub async fn shutdown(&self) -> Result<(), ChatError> {
        self.dispatch(ChatCommand::Shutdown).await
    }

    async fn dispatch(&self, command: ChatCommand) -> Result<(), ChatError> {
        self.commands.send(command).await.map_err(|_| ChatError::SessionClosed)
    }
}

/// Event loop tying the store to its collaborators.
pub struct ChatRuntime<A, R> {
    store: ChatStore,
    api: Arc<A>,
    realtime: Arc<R>,
    config: ChatConfig,
    commands: mpsc::Receiver<ChatCommand>,
    transport_events: mpsc::Receiver<TransportEvent>,
    completions_tx: mpsc::Sender<StoreEvent>,
    completions_rx: mpsc::Receiver<StoreEvent>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

impl<A: ChatApi, R: RealtimeChannel> ChatRuntime<A, R> {
    /// Build a runtime for the authenticated user.
    ///
    /// `transport_events` is the inbound stream from the real-time
    /// channel (see `RealtimeClient::connect`). Returns the runtime and
    /// the handle views use to drive it.
    pub fn new(
        me: UserId,
        config: ChatConfig,
        api: A,
        realtime: R,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> (Self, ChatHandle) {
        let store = ChatStore::new(me);
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (completions_tx, completions_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(store.snapshot());

        let handle = ChatHandle { commands: commands_tx, snapshot: snapshot_rx };
        let runtime = Self {
            store,
            api: Arc::new(api),
            realtime: Arc::new(realtime),
            config,
            commands: commands_rx,
            transport_events,
            completions_tx,
            completions_rx,
            snapshot_tx,
        };
        (runtime, handle)
    }

    /// Run the event loop until shutdown.
    ///
    /// Every branch runs a store mutation to completion before the next
    /// event is taken, so mutations never interleave; the only
    /// concurrency is between in-flight effects, which is what the
    /// store's correlation ids and request tokens arbitrate.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(ChatCommand::Shutdown) => break,
                        Some(command) => {
                            let effects = self.dispatch(command);
                            self.execute(effects);
                        },
                    }
                },
                Some(event) = self.transport_events.recv() => {
                    let effects = self.store.handle(translate(event));
                    self.execute(effects);
                },
                Some(event) = self.completions_rx.recv() => {
                    let effects = self.store.handle(event);
                    self.execute(effects);
                },
            }
            self.publish();
        }
        tracing::debug!("chat runtime stopped");
    }

    /// Store state after all queued events, for assertions in tests.
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    fn dispatch(&mut self, command: ChatCommand) -> Vec<Effect> {
        match command {
            ChatCommand::LoadConversations => self.store.load_conversations(),
            ChatCommand::OpenConversation(counterpart) => {
                self.store.open_conversation(counterpart)
            },
            ChatCommand::SendMessage(text) => match self.store.send_message(&text) {
                Ok(effects) => effects,
                Err(e) => {
                    // The handle validates before enqueueing; hitting this
                    // means the selection changed while the command was in
                    // the queue.
                    self.store.record_error(&e);
                    Vec::new()
                },
            },
            ChatCommand::MarkConversationRead(key) => self.store.mark_conversation_read(&key),
            ChatCommand::DeleteConversation(id) => self.store.delete_conversation(id),
            ChatCommand::ClearError => {
                self.store.clear_error();
                Vec::new()
            },
            ChatCommand::Shutdown => Vec::new(),
        }
    }

    fn execute(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.spawn_effect(effect);
        }
    }

    fn spawn_effect(&self, effect: Effect) {
        let api = Arc::clone(&self.api);
        let realtime = Arc::clone(&self.realtime);
        let completions = self.completions_tx.clone();
        let page_size = self.config.history_page_size;

        tokio::spawn(async move {
            let completion = match effect {
                Effect::FetchConversations { token } => Some(StoreEvent::ConversationsLoaded {
                    token,
                    result: api.list_conversations().await,
                }),
                Effect::ResolveConversation { counterpart } => {
                    let result = api.create_or_get_conversation(&counterpart).await;
                    Some(StoreEvent::ConversationResolved { counterpart, result })
                },
                Effect::FetchHistory { token, conversation } => {
                    let result = api.fetch_messages(&conversation, 0, page_size).await;
                    Some(StoreEvent::HistoryLoaded { token, conversation, result })
                },
                Effect::DeliverMessage { correlation_id, receiver, content } => {
                    let result =
                        deliver(realtime.as_ref(), api.as_ref(), &receiver, &content, correlation_id)
                            .await;
                    Some(StoreEvent::SendCompleted { correlation_id, result })
                },
                Effect::MarkRead { message_ids } => {
                    // Best-effort: read state is a convenience signal, so a
                    // failure is logged, not retried and not rolled back.
                    if let Err(e) = api.mark_read(&message_ids).await {
                        tracing::warn!(error = %e, "mark-read failed");
                    }
                    None
                },
                Effect::DeleteConversation { conversation } => {
                    let result = api.delete_conversation(&conversation).await;
                    Some(StoreEvent::ConversationDeleted { conversation, result })
                },
            };

            if let Some(event) = completion
                && completions.send(event).await.is_err()
            {
                tracing::debug!("runtime gone before completion was delivered");
            }
        });
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.store.snapshot());
    }
}

/// Real-time first, REST fallback.
///
/// The real-time path is only trusted when it fails transiently
/// (disconnected or ack timeout); a server rejection is final and is not
/// retried over REST.
async fn deliver<A: ChatApi, R: RealtimeChannel>(
    realtime: &R,
    api: &A,
    receiver: &UserId,
    content: &str,
    correlation_id: waypost_core::CorrelationId,
) -> Result<waypost_core::Message, ChatError> {
    if realtime.is_connected() {
        match realtime.send(receiver, content, correlation_id).await {
            Ok(message) => return Ok(message),
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, "realtime send failed, falling back to rest");
            },
            Err(e) => return Err(e),
        }
    }
    api.send_message(receiver, content).await
}

fn translate(event: TransportEvent) -> StoreEvent {
    match event {
        TransportEvent::NewMessage(message) => StoreEvent::MessageReceived(message),
        TransportEvent::MessageSent { correlation_id, message } => {
            // Usually redundant with the send future's own completion;
            // the store treats the second arrival as a replay.
            StoreEvent::SendCompleted { correlation_id, result: Ok(message) }
        },
        TransportEvent::PresenceChanged { user_id, online } => {
            StoreEvent::PresenceChanged { user_id, online }
        },
        TransportEvent::ConnectionChanged { connected, error } => {
            StoreEvent::ConnectionChanged { connected, error }
        },
    }
}
