//! Store output effects.
//!
//! The store never performs I/O; it returns these instructions for the
//! runtime to execute. Each effect that has a completion carries the
//! identifiers (request token or correlation id) the completion event
//! must echo back.

use waypost_core::{ConversationId, CorrelationId, MessageId, UserId};

use crate::event::RequestToken;

/// Instructions produced by the chat store for the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch the full conversation list.
    FetchConversations {
        /// Token to echo in `ConversationsLoaded`.
        token: RequestToken,
    },

    /// Create or fetch the conversation with `counterpart`.
    ResolveConversation {
        /// The counterpart user.
        counterpart: UserId,
    },

    /// Fetch the first history page for a conversation.
    FetchHistory {
        /// Token to echo in `HistoryLoaded`.
        token: RequestToken,
        /// Conversation to fetch.
        conversation: ConversationId,
    },

    /// Deliver an optimistic message: real-time first, REST fallback.
    DeliverMessage {
        /// Correlation id of the pending message.
        correlation_id: CorrelationId,
        /// Receiver's user id.
        receiver: UserId,
        /// Text content.
        content: String,
    },

    /// Best-effort mark-read signal. No completion event; failures are
    /// logged and never rolled back.
    MarkRead {
        /// Messages to mark as read.
        message_ids: Vec<MessageId>,
    },

    /// Delete a conversation server-side.
    DeleteConversation {
        /// Conversation to delete.
        conversation: ConversationId,
    },
}
