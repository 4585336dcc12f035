//! Typed inbound events the transport adapter emits to the store.

use waypost_core::{CorrelationId, Message, UserId};

/// Events fed into the store's reconciliation entry point.
///
/// The adapter deliberately does not deduplicate: a reconnect replay may
/// deliver the same canonical message id twice, and the store's
/// reconciliation owns that concern.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound message from another user.
    NewMessage(Message),

    /// Server acknowledgment of a message this client sent.
    MessageSent {
        /// Correlation id from the original send request.
        correlation_id: CorrelationId,
        /// The confirmed message, carrying its canonical id.
        message: Message,
    },

    /// A counterpart's presence changed.
    PresenceChanged {
        /// User whose presence changed.
        user_id: UserId,
        /// New presence.
        online: bool,
    },

    /// The connection was established or lost.
    ConnectionChanged {
        /// Whether the channel is now connected.
        connected: bool,
        /// Error that caused a disconnect. `None` on a clean connect.
        error: Option<String>,
    },
}
