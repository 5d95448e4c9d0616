//! # causerie-memory
//!
//! In-process implementation of the backend boundary, for development
//! and tests.  A [`MemoryHub`] holds one shared world (accounts,
//! profiles, chats, messages) and mints per-client handles the way
//! separate browsers share one hosted backend: every [`MemoryClient`]
//! carries its own auth session and observer registry while reads,
//! writes, and live-query fan-out go through the hub.
//!
//! The hub enforces the hosted service's security-rule shape: document
//! operations require an active session, and presence writes must own
//! the profile they touch.  It is a reference backend, not a persistence
//! engine; nothing survives the process.

mod client;
mod hub;

pub use client::MemoryClient;
pub use hub::MemoryHub;
