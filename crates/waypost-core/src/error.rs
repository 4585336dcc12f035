//! Error types for the chat client core.
//!
//! Strongly-typed errors covering the failure taxonomy: synchronous
//! validation failures, REST collaborator failures, transient real-time
//! channel failures (which trigger the REST fallback), and server
//! rejections (which trigger optimistic rollback).

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the chat store and transport adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Message text was empty after trimming. Rejected before any I/O.
    #[error("message text is empty")]
    EmptyMessage,

    /// No conversation is selected. Rejected before any I/O.
    #[error("no conversation selected")]
    NoActiveConversation,

    /// REST collaborator request failed.
    #[error("request failed: {0}")]
    Api(String),

    /// Real-time channel is not connected.
    #[error("realtime channel disconnected")]
    Disconnected,

    /// No server acknowledgment arrived within the configured window.
    #[error("send not acknowledged within {0:?}")]
    AckTimeout(Duration),

    /// The server explicitly rejected the operation.
    #[error("rejected by server: {0}")]
    SendRejected(String),

    /// The chat session has been torn down; no further actions accepted.
    #[error("chat session closed")]
    SessionClosed,
}

impl ChatError {
    /// Returns true for failures detected before any network call.
    ///
    /// Validation failures never mutate store state; the caller simply
    /// gets an immediate error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyMessage | Self::NoActiveConversation)
    }

    /// Returns true if the real-time path failed in a way the REST
    /// fallback may still succeed on.
    ///
    /// Server rejections are never transient - retrying over a different
    /// transport would just be rejected again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Disconnected | Self::AckTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_transient() {
        assert!(ChatError::EmptyMessage.is_validation());
        assert!(!ChatError::EmptyMessage.is_transient());
        assert!(ChatError::NoActiveConversation.is_validation());
    }

    #[test]
    fn channel_failures_are_transient() {
        assert!(ChatError::Disconnected.is_transient());
        assert!(ChatError::AckTimeout(Duration::from_secs(5)).is_transient());
        assert!(!ChatError::SendRejected("bad receiver".into()).is_transient());
        assert!(!ChatError::Api("500".into()).is_transient());
    }
}
