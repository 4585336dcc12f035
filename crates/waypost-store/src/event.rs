//! Store input events.
//!
//! Everything that can change chat state arrives here: completions of
//! effects the runtime executed, and inbound transport events. The store
//! processes each event to completion before the next, so mutations are
//! atomic with respect to each other.

use waypost_core::{ChatError, Conversation, ConversationId, CorrelationId, Message, UserId};

/// Token identifying one issued fetch; stale completions are discarded
/// by comparing against the most recently issued token.
pub type RequestToken = u64;

/// Events processed by the chat store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Conversation-list fetch completed.
    ConversationsLoaded {
        /// Token of the request this completes.
        token: RequestToken,
        /// Fetched list, or the failure to record.
        result: Result<Vec<Conversation>, ChatError>,
    },

    /// Create-or-get for a counterpart completed.
    ConversationResolved {
        /// Counterpart the request was issued for.
        counterpart: UserId,
        /// Server's conversation (authoritative on duplicates), or the
        /// failure that rolls the provisional entry back.
        result: Result<Conversation, ChatError>,
    },

    /// Message-history fetch completed.
    HistoryLoaded {
        /// Token of the request this completes.
        token: RequestToken,
        /// Conversation the history belongs to.
        conversation: ConversationId,
        /// Fetched page, or the failure to record.
        result: Result<Vec<Message>, ChatError>,
    },

    /// A send attempt finished on some transport path.
    SendCompleted {
        /// Correlation id of the optimistic message.
        correlation_id: CorrelationId,
        /// Confirmed message, or the failure that triggers rollback.
        result: Result<Message, ChatError>,
    },

    /// Inbound message from the real-time channel or REST polling.
    MessageReceived(Message),

    /// A counterpart's presence changed.
    PresenceChanged {
        /// User whose presence changed.
        user_id: UserId,
        /// New presence.
        online: bool,
    },

    /// Real-time connection state transition.
    ConnectionChanged {
        /// Whether the channel is now connected.
        connected: bool,
        /// Error that caused a disconnect, if any.
        error: Option<String>,
    },

    /// Conversation deletion completed.
    ConversationDeleted {
        /// Conversation the deletion was issued for.
        conversation: ConversationId,
        /// Success removes the local entry; failure only records the
        /// error.
        result: Result<(), ChatError>,
    },
}
