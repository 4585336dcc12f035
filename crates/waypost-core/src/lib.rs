//! Core types for the waypost chat client.
//!
//! Defines the message/conversation data model, the pure reconciliation
//! helpers the store is built on, the error taxonomy, and the tunable
//! configuration constants. No I/O lives here; everything is deterministic
//! and separately testable.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;

pub use config::ChatConfig;
pub use error::ChatError;
pub use model::{
    ConnectionStatus, Conversation, ConversationId, ConversationKey, CorrelationId, Counterpart,
    Message, MessageId, MessageStatus, UserId,
};
