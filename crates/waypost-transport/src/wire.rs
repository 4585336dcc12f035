//! Wire representations shared by the REST and WebSocket paths.
//!
//! The server speaks camelCase JSON; these DTOs keep that shape at the
//! edge and convert into the core model types, applying the timestamp
//! fallback on the way in.

use serde::{Deserialize, Serialize};
use waypost_core::reconcile::parse_timestamp;
use waypost_core::{
    Conversation, ConversationId, CorrelationId, Counterpart, Message, MessageId, MessageStatus,
    UserId,
};

/// A server-confirmed message as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    /// Canonical message id.
    pub id: String,
    /// Sender's user id.
    pub sender_id: String,
    /// Receiver's user id.
    pub receiver_id: String,
    /// Text content.
    pub content: String,
    /// RFC 3339 creation timestamp.
    pub sent_at: String,
    /// Read flag.
    #[serde(default)]
    pub read: bool,
}

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        Self {
            status: MessageStatus::Confirmed { id: MessageId::new(dto.id) },
            sender_id: UserId::new(dto.sender_id),
            receiver_id: UserId::new(dto.receiver_id),
            content: dto.content,
            sent_at: parse_timestamp(&dto.sent_at),
            read: dto.read,
        }
    }
}

/// Counterpart summary as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartDto {
    /// Counterpart's user id.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Avatar URL, if any.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Presence flag.
    #[serde(default)]
    pub online: bool,
}

impl From<CounterpartDto> for Counterpart {
    fn from(dto: CounterpartDto) -> Self {
        Self {
            user_id: UserId::new(dto.user_id),
            display_name: dto.display_name,
            avatar_url: dto.avatar_url,
            online: dto.online,
        }
    }
}

/// Conversation as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    /// Canonical conversation id.
    pub id: String,
    /// The other participant.
    pub counterpart: CounterpartDto,
    /// Most recent message, if any.
    #[serde(default)]
    pub last_message: Option<MessageDto>,
    /// Unread message count.
    #[serde(default)]
    pub unread_count: u32,
    /// RFC 3339 last-activity timestamp.
    pub last_activity: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<ConversationDto> for Conversation {
    fn from(dto: ConversationDto) -> Self {
        Self {
            id: Some(ConversationId::new(dto.id)),
            counterpart: dto.counterpart.into(),
            last_message: dto.last_message.map(Message::from),
            unread_count: dto.unread_count,
            last_activity: parse_timestamp(&dto.last_activity),
            created_at: parse_timestamp(&dto.created_at),
        }
    }
}

/// Frames the server pushes over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Inbound message from another user.
    NewMessage {
        /// The message payload.
        message: MessageDto,
    },
    /// Ack for a message this client sent over the socket.
    MessageSent {
        /// Correlation id echoed from the send request.
        correlation_id: CorrelationId,
        /// The confirmed message with its canonical id.
        message: MessageDto,
    },
    /// A user came online.
    UserOnline {
        /// The user's id.
        user_id: String,
    },
    /// A user went offline.
    UserOffline {
        /// The user's id.
        user_id: String,
    },
}

/// Frames this client sends over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Send a direct message.
    SendMessage {
        /// Receiver's user id.
        receiver_id: String,
        /// Text content.
        content: String,
        /// Client-generated correlation id, echoed in the ack.
        correlation_id: CorrelationId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_frame_uses_type_tag() -> Result<(), serde_json::Error> {
        let json = r#"{
            "type": "messageSent",
            "correlationId": "4b4a2b1e-9c5e-4d3f-8f25-0b1f8c2d9a11",
            "message": {
                "id": "m1",
                "senderId": "alice",
                "receiverId": "bob",
                "content": "hi",
                "sentAt": "2024-05-01T10:00:00Z",
                "read": false
            }
        }"#;

        let frame: ServerFrame = serde_json::from_str(json)?;
        assert!(matches!(frame, ServerFrame::MessageSent { .. }));
        Ok(())
    }

    #[test]
    fn client_frame_serializes_camel_case() {
        let frame = ClientFrame::SendMessage {
            receiver_id: "bob".into(),
            content: "hi".into(),
            correlation_id: CorrelationId::new_v4(),
        };
        let json = serde_json::to_string(&frame).unwrap_or_default();

        assert!(json.contains("\"type\":\"sendMessage\""));
        assert!(json.contains("\"receiverId\":\"bob\""));
        assert!(json.contains("correlationId"));
    }

    #[test]
    fn malformed_timestamp_still_converts() {
        let dto = MessageDto {
            id: "m1".into(),
            sender_id: "alice".into(),
            receiver_id: "bob".into(),
            content: "hi".into(),
            sent_at: "garbage".into(),
            read: false,
        };

        let message: Message = dto.into();
        assert_eq!(message.canonical_id(), Some(&MessageId::new("m1")));
    }
}
