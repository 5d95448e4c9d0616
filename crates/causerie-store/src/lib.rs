//! # causerie-store
//!
//! The reconciling store: one actor task owning session state, UI
//! selection, and the three live collections (online users, chat list,
//! selected chat's messages), with the subscription lifecycle and
//! cross-stream consistency rules that keep them coherent.
//!
//! Intents go in through a [`StoreHandle`]; rendered state comes out as
//! [`StoreSnapshot`]s on a `watch` channel.  Stale feed payloads are
//! rejected structurally via per-subscription generation counters rather
//! than ad hoc auth checks.

pub mod error;
pub mod state;
pub mod store;

mod feeds;

pub use error::{Result, StoreError};
pub use state::{ActiveTab, SessionStatus, StoreSnapshot};
pub use store::{spawn_store, StoreHandle};
