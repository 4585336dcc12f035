//! Chat store for the waypost client.
//!
//! The store is a pure state machine in the same mold as the transport
//! adapter's consumer contract: commands and [`StoreEvent`]s go in,
//! [`Effect`]s come out, and no I/O happens inside. The [`ChatRuntime`]
//! executes effects against the REST and real-time collaborators and
//! feeds completions back in, publishing a read-only [`ChatSnapshot`]
//! to views after every mutation.
//!
//! # Components
//!
//! - [`ChatStore`]: single writer of all locally visible chat state
//! - [`ChatRuntime`]: async orchestration loop, generic over the
//!   transport seams for deterministic testing
//! - [`ChatHandle`]: cloneable, view-facing command/snapshot surface

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod effect;
mod event;
mod runtime;
mod state;
mod store;

pub use effect::Effect;
pub use event::StoreEvent;
pub use runtime::{ChatCommand, ChatHandle, ChatRuntime};
pub use state::ChatSnapshot;
pub use store::ChatStore;
