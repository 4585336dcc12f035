//! Read-only view of the store.

use waypost_core::{ConnectionStatus, Conversation, ConversationKey, Message};

/// Snapshot of chat state published to views after every mutation.
///
/// Views only ever read snapshots and dispatch commands; the store is
/// the single writer.
#[derive(Debug, Clone, Default)]
pub struct ChatSnapshot {
    /// Conversations, most recent activity first.
    pub conversations: Vec<Conversation>,
    /// Key of the open conversation, if any.
    pub selected: Option<ConversationKey>,
    /// Messages of the open conversation, ascending by creation time.
    pub messages: Vec<Message>,
    /// Real-time connection state.
    pub connection: ConnectionStatus,
    /// Whether a conversation-list fetch is in flight.
    pub is_loading: bool,
    /// Most recent failure, if any. Newer failures overwrite older ones.
    pub error: Option<String>,
}

impl ChatSnapshot {
    /// The open conversation's entry, if one is selected.
    pub fn selected_conversation(&self) -> Option<&Conversation> {
        let key = self.selected.as_ref()?;
        self.conversations.iter().find(|c| &c.key() == key)
    }

    /// Whether the real-time channel is connected.
    pub fn is_connected(&self) -> bool {
        self.connection.connected
    }
}
