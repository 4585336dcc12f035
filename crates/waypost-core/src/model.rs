//! Chat data model.
//!
//! These types are the "view model" of the chat subsystem: the subset of
//! server state the client needs to render conversations and threads,
//! plus the provisional state that only exists client-side while a send
//! is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque server-assigned user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a user id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical server-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a message id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Canonical server-assigned conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Create a conversation id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Client-generated id correlating an optimistic send with its server ack.
pub type CorrelationId = Uuid;

/// Confirmation state of a message.
///
/// A message is either still awaiting its server ack (identified only by
/// the client-side correlation id) or confirmed under a canonical id.
/// Confirmation replaces the whole status; ids are never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    /// Locally created, not yet acknowledged by the server.
    Pending {
        /// Client-side correlation id carried on the send request.
        correlation_id: CorrelationId,
    },
    /// Acknowledged by the server under a canonical id.
    Confirmed {
        /// Server-assigned message id.
        id: MessageId,
    },
}

/// A single direct message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Pending or confirmed identity.
    pub status: MessageStatus,
    /// Sender's user id.
    pub sender_id: UserId,
    /// Receiver's user id.
    pub receiver_id: UserId,
    /// Text content.
    pub content: String,
    /// Creation timestamp.
    pub sent_at: DateTime<Utc>,
    /// Whether the receiver has read the message.
    pub read: bool,
}

impl Message {
    /// Canonical id. `None` while the message is pending.
    pub fn canonical_id(&self) -> Option<&MessageId> {
        match &self.status {
            MessageStatus::Confirmed { id } => Some(id),
            MessageStatus::Pending { .. } => None,
        }
    }

    /// Correlation id. `None` once the message is confirmed.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match &self.status {
            MessageStatus::Pending { correlation_id } => Some(*correlation_id),
            MessageStatus::Confirmed { .. } => None,
        }
    }

    /// Whether the message is still awaiting server confirmation.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, MessageStatus::Pending { .. })
    }
}

/// The other participant of a one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterpart {
    /// Counterpart's user id.
    pub user_id: UserId,
    /// Display name shown in the conversation list.
    pub display_name: String,
    /// Avatar URL. `None` when the user has no avatar.
    pub avatar_url: Option<String>,
    /// Last known presence.
    pub online: bool,
}

impl Counterpart {
    /// Placeholder counterpart for a user we only know by id.
    ///
    /// Used when an inbound message arrives from an unknown sender; the
    /// real summary is filled in by the next conversation-list refresh.
    pub fn unresolved(user_id: UserId) -> Self {
        let display_name = user_id.0.clone();
        Self { user_id, display_name, avatar_url: None, online: false }
    }
}

/// Local lookup key for a conversation.
///
/// Conversations that the server has not assigned an id yet are keyed by
/// their counterpart. This key is purely local and never sent to the
/// server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    /// Server-assigned conversation id.
    Assigned(ConversationId),
    /// Not yet created server-side; derived from the counterpart.
    Provisional(UserId),
}

/// A one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Server-assigned id. `None` until the server creates the conversation.
    pub id: Option<ConversationId>,
    /// The other participant.
    pub counterpart: Counterpart,
    /// Most recent message. `None` for a conversation with no messages.
    pub last_message: Option<Message>,
    /// Confirmed inbound messages not yet read while deselected.
    pub unread_count: u32,
    /// Timestamp of the last message activity.
    pub last_activity: DateTime<Utc>,
    /// When the conversation entry was created.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with the given counterpart.
    pub fn new(counterpart: Counterpart, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            counterpart,
            last_message: None,
            unread_count: 0,
            last_activity: created_at,
            created_at,
        }
    }

    /// Local lookup key: the server id when assigned, otherwise the
    /// counterpart-derived placeholder.
    pub fn key(&self) -> ConversationKey {
        match &self.id {
            Some(id) => ConversationKey::Assigned(id.clone()),
            None => ConversationKey::Provisional(self.counterpart.user_id.clone()),
        }
    }

    /// Timestamp the recency sort orders by.
    ///
    /// A conversation that has never seen a message sorts by creation time.
    pub fn activity_time(&self) -> DateTime<Utc> {
        if self.last_message.is_some() { self.last_activity } else { self.created_at }
    }

    /// Record a new most-recent message and bump activity.
    pub fn touch(&mut self, message: Message) {
        self.last_activity = message.sent_at;
        self.last_message = Some(message);
    }
}

/// Real-time connection state as observed by the store.
///
/// Owned by the transport adapter; the store only mirrors it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Whether the real-time channel is currently established.
    pub connected: bool,
    /// Most recent connection error. `None` after a clean connect.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_prefers_assigned_id() {
        let mut conv =
            Conversation::new(Counterpart::unresolved(UserId::new("u1")), Utc::now());
        assert_eq!(conv.key(), ConversationKey::Provisional(UserId::new("u1")));

        conv.id = Some(ConversationId::new("c1"));
        assert_eq!(conv.key(), ConversationKey::Assigned(ConversationId::new("c1")));
    }

    #[test]
    fn empty_conversation_sorts_by_creation_time() {
        let created = Utc::now();
        let conv = Conversation::new(Counterpart::unresolved(UserId::new("u1")), created);
        assert_eq!(conv.activity_time(), created);
    }

    #[test]
    fn confirmed_message_has_no_correlation_id() {
        let msg = Message {
            status: MessageStatus::Confirmed { id: MessageId::new("m1") },
            sender_id: UserId::new("a"),
            receiver_id: UserId::new("b"),
            content: "hi".into(),
            sent_at: Utc::now(),
            read: false,
        };
        assert_eq!(msg.correlation_id(), None);
        assert_eq!(msg.canonical_id(), Some(&MessageId::new("m1")));
        assert!(!msg.is_pending());
    }
}
