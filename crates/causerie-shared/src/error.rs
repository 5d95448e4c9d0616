use thiserror::Error;

/// Failures from the identity provider or the session gateway.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account already exists for this email")]
    AccountExists,

    #[error("Federated sign-in was cancelled")]
    FlowCancelled,

    #[error("Network error during authentication: {0}")]
    Network(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    /// The provider accepted the credentials but the mirrored profile
    /// record could not be read or written.
    #[error("Profile record access failed: {0}")]
    Profile(#[source] DataAccessError),
}

/// Failures from the document store boundary.
///
/// Permission denials are the characteristic post-logout race: once the
/// session is invalidated, any straggling read or write is rejected by
/// the backend's security rules.
#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No such record: {0}")]
    NotFound(String),

    #[error("Document backend unavailable: {0}")]
    Unavailable(String),
}

/// Caller-local input validation failures.  These never reach the store.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Display name cannot be empty")]
    EmptyDisplayName,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Message cannot be empty")]
    EmptyMessage,
}
