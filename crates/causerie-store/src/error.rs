use thiserror::Error;

use causerie_shared::{AuthError, DataAccessError};

/// Errors surfaced by store intents.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Document access failed: {0}")]
    Data(#[from] DataAccessError),

    #[error("No active session")]
    NotSignedIn,

    /// The store task is gone; every intent on this handle fails.
    #[error("Store is no longer running")]
    Stopped,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
