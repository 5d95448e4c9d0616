//! Document store boundary.
//!
//! Typed operations over the three logical collections (user profiles,
//! chats, per-chat messages) plus their live-subscription variants.
//! Live queries replay the full matching result set on every change:
//! they are snapshots, never diffs.

use async_trait::async_trait;

use causerie_shared::{Chat, ChatId, DataAccessError, Message, MessageId, MessageKind, UserId, UserProfile};

use crate::subscription::{SnapshotSink, Subscription};

/// Typed access to the hosted document database.
///
/// All operations run against the caller's auth session; once that
/// session is invalidated they fail with
/// [`DataAccessError::PermissionDenied`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, DataAccessError>;

    /// Create or replace a profile record.
    async fn upsert_user(&self, profile: &UserProfile) -> Result<(), DataAccessError>;

    /// Flip a profile's online flag and bump `last_seen`.  Only the
    /// session owning the profile may write it.
    async fn set_user_presence(&self, id: &UserId, online: bool) -> Result<(), DataAccessError>;

    async fn get_online_users(&self) -> Result<Vec<UserProfile>, DataAccessError>;

    /// Live view of all online profiles.  The caller's own profile is
    /// included; filtering out the session identity is the consumer's
    /// concern.
    fn subscribe_online_users(
        &self,
        sink: SnapshotSink<Vec<UserProfile>>,
    ) -> Result<Subscription, DataAccessError>;

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// Create a chat; two participants make a private chat, more (or an
    /// explicit name) make a group.
    async fn create_chat(
        &self,
        participants: &[UserId],
        name: Option<String>,
    ) -> Result<ChatId, DataAccessError>;

    /// First private chat matching the unordered pair, if any.
    async fn find_existing_private_chat(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<ChatId>, DataAccessError>;

    /// The user's chats, `last_message_at` descending, never-messaged
    /// chats last.
    async fn get_user_chats(&self, user: &UserId) -> Result<Vec<Chat>, DataAccessError>;

    /// Live variant of [`get_user_chats`](Self::get_user_chats); re-fires
    /// on every change to any matching chat document.
    fn subscribe_user_chats(
        &self,
        user: &UserId,
        sink: SnapshotSink<Vec<Chat>>,
    ) -> Result<Subscription, DataAccessError>;

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Append a message.  The append and the parent chat's
    /// `last_message`/`last_message_at` update are one atomic write, so
    /// the chat list can never observe a stale preview for a committed
    /// message.
    async fn send_message(
        &self,
        chat: &ChatId,
        sender: &UserId,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageId, DataAccessError>;

    /// One-shot page of the most recent messages, in chronological order.
    async fn get_chat_messages(
        &self,
        chat: &ChatId,
        limit: usize,
    ) -> Result<Vec<Message>, DataAccessError>;

    /// Live view of a chat's full ordered message list.
    fn subscribe_chat_messages(
        &self,
        chat: &ChatId,
        sink: SnapshotSink<Vec<Message>>,
    ) -> Result<Subscription, DataAccessError>;

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Resolves once the document layer acknowledges the current auth
    /// session, i.e. once security rules will accept queries for it.
    /// Subscribing to presence before this acknowledgment risks a
    /// permission denial on a session the backend has not yet seen.
    async fn session_ready(&self) -> Result<(), DataAccessError>;
}
