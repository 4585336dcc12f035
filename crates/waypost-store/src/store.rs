//! Chat store state machine.
//!
//! [`ChatStore`] is the single authority for all locally visible chat
//! state. It is a pure state machine: commands from views and
//! [`StoreEvent`]s from the runtime go in, state mutates, and
//! [`Effect`]s come out for the runtime to execute. No I/O dependencies,
//! so every interleaving is testable without a network.
//!
//! # Invariants
//!
//! - The open thread is ascending by creation time, at most one message
//!   per canonical id.
//! - Conversations are unique per counterpart and ordered by last
//!   activity, most recent first.
//! - The open conversation's unread count is zero.
//! - A failed fetch never blanks existing data; a failed send leaves no
//!   phantom message behind.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use waypost_core::reconcile::{
    position_by_counterpart, reconcile_incoming, remove_by_correlation, sort_conversations,
};
use waypost_core::{
    ChatError, ConnectionStatus, Conversation, ConversationId, ConversationKey, CorrelationId,
    Counterpart, Message, MessageId, MessageStatus, UserId,
};

use crate::effect::Effect;
use crate::event::{RequestToken, StoreEvent};
use crate::state::ChatSnapshot;

/// State saved per in-flight send so a failure can restore the
/// conversation exactly as it was before the optimistic update.
///
/// Each send is tracked independently by correlation id; there is no
/// shared in-flight flag, so any number of sends may overlap.
#[derive(Debug, Clone)]
struct SendContext {
    counterpart: UserId,
    prior_last_message: Option<Message>,
    prior_last_activity: DateTime<Utc>,
}

/// The chat store.
#[derive(Debug, Clone)]
pub struct ChatStore {
    /// The authenticated user.
    me: UserId,
    /// Conversations, most recent activity first, unique by counterpart.
    conversations: Vec<Conversation>,
    /// Counterpart of the open conversation. `None` when nothing is open.
    selected: Option<UserId>,
    /// Messages of the open conversation.
    messages: Vec<Message>,
    /// Rollback state per in-flight send.
    pending_sends: HashMap<CorrelationId, SendContext>,
    /// Canonical ids already folded into local state. Any transport path
    /// may redeliver after a reconnect; replays of ids in this set are
    /// dropped before they can double-count unread or bump recency.
    seen_messages: HashSet<MessageId>,
    /// Mirrored transport connection state.
    connection: ConnectionStatus,
    /// Whether a conversation-list fetch is in flight.
    loading: bool,
    /// Most recent failure; newer failures overwrite older ones.
    error: Option<String>,
    /// Most recently issued conversation-list request token.
    conversations_token: RequestToken,
    /// Most recently issued history request token.
    history_token: RequestToken,
}

impl ChatStore {
    /// Create an empty store for the authenticated user.
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            conversations: Vec::new(),
            selected: None,
            messages: Vec::new(),
            pending_sends: HashMap::new(),
            seen_messages: HashSet::new(),
            connection: ConnectionStatus::default(),
            loading: false,
            error: None,
            conversations_token: 0,
            history_token: 0,
        }
    }

    // ----- commands ------------------------------------------------------

    /// Request a refresh of the conversation list.
    ///
    /// If an earlier fetch is still in flight its completion is discarded;
    /// the newest request wins.
    pub fn load_conversations(&mut self) -> Vec<Effect> {
        self.loading = true;
        self.conversations_token += 1;
        vec![Effect::FetchConversations { token: self.conversations_token }]
    }

    /// Open the conversation with `counterpart`, creating a local entry
    /// (and asking the server for the canonical one) if none exists.
    ///
    /// Opening resets the unread count and triggers a history fetch once
    /// a server id is known. Calling this twice for the same counterpart
    /// never creates a second entry: the lookup finds the provisional one
    /// and the server's create-or-get is authoritative on duplicates.
    pub fn open_conversation(&mut self, counterpart: Counterpart) -> Vec<Effect> {
        let user_id = counterpart.user_id.clone();
        if self.selected.as_ref() != Some(&user_id) {
            self.messages.clear();
        }
        self.selected = Some(user_id.clone());

        let mut effects = Vec::new();
        match position_by_counterpart(&self.conversations, &user_id) {
            Some(pos) => {
                self.conversations[pos].unread_count = 0;
                if let Some(id) = self.conversations[pos].id.clone() {
                    effects.push(self.request_history(id));
                }
                // No id yet: a create-or-get is already in flight and its
                // completion triggers the history fetch.
            },
            None => {
                self.conversations.insert(0, Conversation::new(counterpart, Utc::now()));
                effects.push(Effect::ResolveConversation { counterpart: user_id });
            },
        }
        effects
    }

    /// Send a message to the open conversation.
    ///
    /// The message appears in the thread immediately as pending; the
    /// runtime attempts delivery and reports back via `SendCompleted`.
    /// Validation failures are returned synchronously with no state
    /// change.
    pub fn send_message(&mut self, text: &str) -> Result<Vec<Effect>, ChatError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let pos = self.selected_position().ok_or(ChatError::NoActiveConversation)?;

        let receiver = self.conversations[pos].counterpart.user_id.clone();
        let correlation_id = Uuid::new_v4();
        let message = Message {
            status: MessageStatus::Pending { correlation_id },
            sender_id: self.me.clone(),
            receiver_id: receiver.clone(),
            content: content.to_owned(),
            sent_at: Utc::now(),
            read: false,
        };

        reconcile_incoming(&mut self.messages, message.clone(), None);

        let conversation = &mut self.conversations[pos];
        self.pending_sends.insert(correlation_id, SendContext {
            counterpart: receiver.clone(),
            prior_last_message: conversation.last_message.clone(),
            prior_last_activity: conversation.last_activity,
        });
        conversation.touch(message);
        sort_conversations(&mut self.conversations);

        Ok(vec![Effect::DeliverMessage {
            correlation_id,
            receiver,
            content: content.to_owned(),
        }])
    }

    /// Zero a conversation's unread count and signal the server.
    ///
    /// The server signal is best-effort: a failure is logged by the
    /// runtime and the local count is never rolled back.
    pub fn mark_conversation_read(&mut self, key: &ConversationKey) -> Vec<Effect> {
        let Some(pos) = self.position_by_key(key) else {
            return Vec::new();
        };
        self.conversations[pos].unread_count = 0;

        let counterpart = self.conversations[pos].counterpart.user_id.clone();
        if self.selected.as_ref() == Some(&counterpart) {
            let message_ids = self.mark_open_thread_read(&counterpart);
            if !message_ids.is_empty() {
                return vec![Effect::MarkRead { message_ids }];
            }
        }
        Vec::new()
    }

    /// Request server-side deletion of a conversation.
    ///
    /// The local entry is only removed once the server confirms.
    pub fn delete_conversation(&mut self, conversation: ConversationId) -> Vec<Effect> {
        vec![Effect::DeleteConversation { conversation }]
    }

    /// Record a failure in the store's single error slot.
    pub fn record_error(&mut self, error: &ChatError) {
        self.error = Some(error.to_string());
    }

    /// Dismiss the current error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    // ----- event handling ------------------------------------------------

    /// Process one event and return the effects it triggers.
    ///
    /// This is the single reconciliation entry point: runtime completions
    /// and transport events (live push or REST polling) all land here.
    pub fn handle(&mut self, event: StoreEvent) -> Vec<Effect> {
        match event {
            StoreEvent::ConversationsLoaded { token, result } => {
                self.on_conversations_loaded(token, result)
            },
            StoreEvent::ConversationResolved { counterpart, result } => {
                self.on_conversation_resolved(&counterpart, result)
            },
            StoreEvent::HistoryLoaded { token, conversation, result } => {
                self.on_history_loaded(token, &conversation, result)
            },
            StoreEvent::SendCompleted { correlation_id, result } => {
                self.on_send_completed(correlation_id, result)
            },
            StoreEvent::MessageReceived(message) => self.on_message_received(message),
            StoreEvent::PresenceChanged { user_id, online } => {
                for conversation in &mut self.conversations {
                    if conversation.counterpart.user_id == user_id {
                        conversation.counterpart.online = online;
                    }
                }
                Vec::new()
            },
            StoreEvent::ConnectionChanged { connected, error } => {
                // Connection state only; conversation and message data are
                // untouched so the UI keeps working in REST-only mode.
                self.connection = ConnectionStatus { connected, last_error: error };
                Vec::new()
            },
            StoreEvent::ConversationDeleted { conversation, result } => {
                self.on_conversation_deleted(&conversation, result)
            },
        }
    }

    fn on_conversations_loaded(
        &mut self,
        token: RequestToken,
        result: Result<Vec<Conversation>, ChatError>,
    ) -> Vec<Effect> {
        if token != self.conversations_token {
            tracing::debug!(token, newest = self.conversations_token, "discarding stale list");
            return Vec::new();
        }
        self.loading = false;

        match result {
            Ok(mut list) => {
                // Keep local-only provisional entries the server does not
                // know about yet.
                for existing in &self.conversations {
                    if existing.id.is_none()
                        && position_by_counterpart(&list, &existing.counterpart.user_id).is_none()
                    {
                        list.push(existing.clone());
                    }
                }
                // The open conversation never shows unread.
                if let Some(selected) = self.selected.clone()
                    && let Some(pos) = position_by_counterpart(&list, &selected)
                {
                    list[pos].unread_count = 0;
                }
                // Server summaries count as seen, so a live push of a
                // message the summary already reflects is a replay.
                for id in list
                    .iter()
                    .filter_map(|c| c.last_message.as_ref().and_then(Message::canonical_id))
                {
                    self.seen_messages.insert(id.clone());
                }
                sort_conversations(&mut list);
                self.conversations = list;
            },
            Err(e) => self.record_error(&e), // stale data beats a blank list
        }
        Vec::new()
    }

    fn on_conversation_resolved(
        &mut self,
        counterpart: &UserId,
        result: Result<Conversation, ChatError>,
    ) -> Vec<Effect> {
        match result {
            Ok(server) => {
                let server_id = server.id.clone();
                match position_by_counterpart(&self.conversations, counterpart) {
                    Some(pos) => {
                        let local = &mut self.conversations[pos];
                        local.id = server.id;
                        local.counterpart = server.counterpart;
                        local.created_at = server.created_at;
                        // Optimistic sends may already have bumped the local
                        // entry past what the server returned.
                        if local.last_message.is_none() {
                            local.last_message = server.last_message;
                            local.last_activity = server.last_activity;
                            local.unread_count = server.unread_count;
                        }
                    },
                    None => self.conversations.push(server),
                }

                let mut effects = Vec::new();
                if self.selected.as_ref() == Some(counterpart) {
                    if let Some(pos) = position_by_counterpart(&self.conversations, counterpart) {
                        self.conversations[pos].unread_count = 0;
                    }
                    if let Some(id) = server_id {
                        effects.push(self.request_history(id));
                    }
                }
                sort_conversations(&mut self.conversations);
                effects
            },
            Err(e) => {
                // The server never created the conversation; drop the
                // provisional entry.
                if let Some(pos) = position_by_counterpart(&self.conversations, counterpart)
                    && self.conversations[pos].id.is_none()
                {
                    self.conversations.remove(pos);
                }
                if self.selected.as_ref() == Some(counterpart) {
                    self.selected = None;
                    self.messages.clear();
                }
                self.record_error(&e);
                Vec::new()
            },
        }
    }

    fn on_history_loaded(
        &mut self,
        token: RequestToken,
        conversation: &ConversationId,
        result: Result<Vec<Message>, ChatError>,
    ) -> Vec<Effect> {
        if token != self.history_token {
            tracing::debug!(token, newest = self.history_token, "discarding stale history");
            return Vec::new();
        }
        let Some(pos) = self.selected_position() else {
            return Vec::new();
        };
        if self.conversations[pos].id.as_ref() != Some(conversation) {
            return Vec::new();
        }

        match result {
            Ok(fetched) => {
                // Merge: the page is the base, then everything already in
                // the thread (live pushes, optimistic pendings) folds in
                // through the dedup/ordering invariants.
                let current = std::mem::take(&mut self.messages);
                let mut merged = Vec::with_capacity(fetched.len() + current.len());
                for message in fetched {
                    reconcile_incoming(&mut merged, message, None);
                }
                for message in current {
                    reconcile_incoming(&mut merged, message, None);
                }
                self.messages = merged;
                for id in self.messages.iter().filter_map(Message::canonical_id) {
                    self.seen_messages.insert(id.clone());
                }

                let counterpart = self.conversations[pos].counterpart.user_id.clone();
                self.conversations[pos].unread_count = 0;
                let message_ids = self.mark_open_thread_read(&counterpart);
                if message_ids.is_empty() {
                    Vec::new()
                } else {
                    vec![Effect::MarkRead { message_ids }]
                }
            },
            Err(e) => {
                self.record_error(&e);
                Vec::new()
            },
        }
    }

    fn on_send_completed(
        &mut self,
        correlation_id: CorrelationId,
        result: Result<Message, ChatError>,
    ) -> Vec<Effect> {
        let Some(context) = self.pending_sends.remove(&correlation_id) else {
            // Ack replay, or the confirmation arrived on both the send
            // future and the event stream. Fold into normal dedup.
            if let Ok(message) = result {
                return self.on_message_received(message);
            }
            return Vec::new();
        };

        match result {
            Ok(message) => {
                if let Some(id) = message.canonical_id() {
                    self.seen_messages.insert(id.clone());
                }
                if self.selected.as_ref() == Some(&context.counterpart) {
                    reconcile_incoming(&mut self.messages, message.clone(), Some(correlation_id));
                }
                if let Some(pos) =
                    position_by_counterpart(&self.conversations, &context.counterpart)
                {
                    let conversation = &mut self.conversations[pos];
                    let replaces_last = conversation
                        .last_message
                        .as_ref()
                        .and_then(Message::correlation_id)
                        == Some(correlation_id);
                    if replaces_last || message.sent_at >= conversation.activity_time() {
                        conversation.touch(message);
                    }
                    sort_conversations(&mut self.conversations);
                }
                Vec::new()
            },
            Err(e) => {
                // Both transport paths failed: no phantom message, and the
                // speculative conversation update is restored.
                remove_by_correlation(&mut self.messages, correlation_id);
                if let Some(pos) =
                    position_by_counterpart(&self.conversations, &context.counterpart)
                {
                    let conversation = &mut self.conversations[pos];
                    conversation.last_message = context.prior_last_message;
                    conversation.last_activity = context.prior_last_activity;
                    sort_conversations(&mut self.conversations);
                }
                self.record_error(&e);
                Vec::new()
            },
        }
    }

    fn on_message_received(&mut self, message: Message) -> Vec<Effect> {
        let inbound = message.sender_id != self.me;
        let other =
            if inbound { message.sender_id.clone() } else { message.receiver_id.clone() };

        let mut effects = Vec::new();
        let pos = match position_by_counterpart(&self.conversations, &other) {
            Some(pos) => pos,
            None => {
                // Unknown counterpart: create the entry with a placeholder
                // summary and refresh the list to fill in the real one.
                self.conversations.insert(
                    0,
                    Conversation::new(Counterpart::unresolved(other.clone()), message.sent_at),
                );
                self.loading = true;
                self.conversations_token += 1;
                effects.push(Effect::FetchConversations { token: self.conversations_token });
                0
            },
        };

        // Replay guard: ids already folded into local state are dropped,
        // whether or not they are still the conversation's latest.
        if let Some(id) = message.canonical_id()
            && !self.seen_messages.insert(id.clone())
        {
            return effects;
        }

        let is_open = self.selected.as_ref() == Some(&other);
        if is_open {
            if !reconcile_incoming(&mut self.messages, message.clone(), None) {
                return effects; // duplicate in the open thread
            }
            if inbound && let Some(id) = message.canonical_id().cloned() {
                // The thread is on screen; acknowledge right away so the
                // unread count never moves off zero.
                if let Some(m) =
                    self.messages.iter_mut().find(|m| m.canonical_id() == Some(&id))
                {
                    m.read = true;
                }
                effects.push(Effect::MarkRead { message_ids: vec![id] });
            }
        } else if inbound {
            self.conversations[pos].unread_count += 1;
        }

        let conversation = &mut self.conversations[pos];
        if message.sent_at >= conversation.activity_time() {
            conversation.touch(message);
        }
        sort_conversations(&mut self.conversations);
        effects
    }

    fn on_conversation_deleted(
        &mut self,
        conversation: &ConversationId,
        result: Result<(), ChatError>,
    ) -> Vec<Effect> {
        match result {
            Ok(()) => {
                if let Some(pos) =
                    self.conversations.iter().position(|c| c.id.as_ref() == Some(conversation))
                {
                    let removed = self.conversations.remove(pos);
                    if self.selected.as_ref() == Some(&removed.counterpart.user_id) {
                        self.selected = None;
                        self.messages.clear();
                    }
                }
            },
            Err(e) => self.record_error(&e),
        }
        Vec::new()
    }

    // ----- helpers -------------------------------------------------------

    fn request_history(&mut self, conversation: ConversationId) -> Effect {
        self.history_token += 1;
        Effect::FetchHistory { token: self.history_token, conversation }
    }

    fn selected_position(&self) -> Option<usize> {
        let selected = self.selected.as_ref()?;
        position_by_counterpart(&self.conversations, selected)
    }

    fn position_by_key(&self, key: &ConversationKey) -> Option<usize> {
        self.conversations.iter().position(|c| &c.key() == key)
    }

    /// Flag every unread inbound message in the open thread as read and
    /// return their canonical ids.
    fn mark_open_thread_read(&mut self, counterpart: &UserId) -> Vec<MessageId> {
        let mut ids = Vec::new();
        for message in &mut self.messages {
            if !message.read && &message.sender_id == counterpart {
                if let Some(id) = message.canonical_id().cloned() {
                    message.read = true;
                    ids.push(id);
                }
            }
        }
        ids
    }

    // ----- read surface --------------------------------------------------

    /// The authenticated user.
    pub fn me(&self) -> &UserId {
        &self.me
    }

    /// Conversations, most recent activity first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Messages of the open conversation, ascending by creation time.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Key of the open conversation. `None` when nothing is open.
    pub fn selected_key(&self) -> Option<ConversationKey> {
        let pos = self.selected_position()?;
        Some(self.conversations[pos].key())
    }

    /// Whether a conversation-list fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Mirrored transport connection state.
    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    /// Most recent failure, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Owned snapshot for view consumption.
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            conversations: self.conversations.clone(),
            selected: self.selected_key(),
            messages: self.messages.clone(),
            connection: self.connection.clone(),
            is_loading: self.loading,
            error: self.error.clone(),
        }
    }
}
