//! # causerie-shared
//!
//! Domain types shared by every Causerie crate: identifiers, the user /
//! chat / message models, the error taxonomy, and the chat-list ordering
//! helpers.  The hosted backend owns durability; these types only describe
//! what flows between the boundary traits and the reconciling store.

pub mod constants;
pub mod models;
pub mod types;

mod error;

pub use error::{AuthError, DataAccessError, ValidationError};
pub use models::*;
pub use types::{ChatId, MessageId, UserId};
