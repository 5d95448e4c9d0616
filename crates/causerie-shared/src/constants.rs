/// Application name
pub const APP_NAME: &str = "Causerie";

/// One-shot message fetch page size
pub const MESSAGE_PAGE_SIZE: usize = 50;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Display name used when the provider supplies neither a name nor an email
pub const FALLBACK_DISPLAY_NAME: &str = "Anonymous";

/// Fallback chat name when a private peer's profile cannot be resolved
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Store intent channel capacity
pub const INTENT_CHANNEL_CAPACITY: usize = 64;
