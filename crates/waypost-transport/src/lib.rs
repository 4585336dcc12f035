//! Transport adapter for the waypost chat client.
//!
//! Two collaborators, one seam each:
//!
//! - [`ChatApi`]: the REST collaborator (conversation list, history,
//!   send fallback, mark-read), implemented over HTTP by [`HttpChatApi`].
//! - [`RealtimeChannel`]: the persistent bidirectional channel,
//!   implemented over WebSocket by [`RealtimeClient`], which owns
//!   reconnection and ack correlation and emits typed
//!   [`TransportEvent`]s.
//!
//! Protocol state (dedup, ordering, unread accounting) lives in the
//! store, not here; the adapter's only jobs are connection lifecycle and
//! translating wire frames into typed events.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod event;
mod realtime;
mod rest;
mod wire;

pub use event::TransportEvent;
pub use realtime::{RealtimeChannel, RealtimeClient};
pub use rest::{ChatApi, HttpChatApi};
pub use wire::{ClientFrame, ConversationDto, CounterpartDto, MessageDto, ServerFrame};
