//! Domain model structs mirrored from the hosted document store.
//!
//! Every struct derives `Serialize`/`Deserialize` with camelCase field
//! names so snapshots can be handed directly to a UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// The mirrored profile record for a provider identity.
///
/// Created lazily on the first successful sign-in; `is_online` and
/// `last_seen` are flipped by the session gateway on login and by the
/// store right before logout (while the session still holds write
/// permission on its own record).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    /// Reference to an avatar image, if the provider supplied one.
    pub avatar_url: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChatKind {
    /// Exactly two participants, keyed by the unordered pair.
    Private,
    /// Two or more participants with an explicit name.
    Group,
}

/// A conversation document.
///
/// The message list is deliberately NOT a field here: messages are a
/// derived, subscription-fed view that the store holds for the selected
/// chat only.  `last_message` is a cached preview maintained atomically
/// with every append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    /// Group name, or the other participant's name for private chats
    /// (resolved by the document access layer).
    pub display_name: String,
    pub kind: ChatKind,
    /// Unique participant ids; order carries no meaning.
    pub participant_ids: Vec<UserId>,
    pub last_message: Option<Message>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_participant(&self, user: &UserId) -> bool {
        self.participant_ids.contains(user)
    }

    /// The other participant of a private chat.
    pub fn peer_of(&self, me: &UserId) -> Option<&UserId> {
        if self.kind != ChatKind::Private {
            return None;
        }
        self.participant_ids.iter().find(|id| *id != me)
    }

    /// Whether this private chat is the one for the unordered pair `(a, b)`.
    pub fn matches_private_pair(&self, a: &UserId, b: &UserId) -> bool {
        self.kind == ChatKind::Private && self.is_participant(a) && self.is_participant(b)
    }
}

/// Sort a chat list by recency: `last_message_at` descending, chats that
/// never had a message last.
pub fn sort_chats(chats: &mut [Chat]) {
    chats.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

/// A single chat message.  Immutable once delivered, except for the
/// `edited` flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    /// Timestamp assigned by the backend at append time.  Ordering is
    /// `sent_at` ascending, ties broken by arrival order at the source.
    pub sent_at: DateTime<Utc>,
    pub edited: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chat_at(last: Option<i64>) -> Chat {
        Chat {
            id: ChatId::new(),
            display_name: "test".to_string(),
            kind: ChatKind::Private,
            participant_ids: vec![UserId::new(), UserId::new()],
            last_message: None,
            last_message_at: last.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sort_chats_missing_recency_last() {
        let mut chats = vec![chat_at(Some(5)), chat_at(None), chat_at(Some(3))];
        sort_chats(&mut chats);

        let order: Vec<Option<i64>> = chats
            .iter()
            .map(|c| c.last_message_at.map(|t| t.timestamp()))
            .collect();
        assert_eq!(order, vec![Some(5), Some(3), None]);
    }

    #[test]
    fn test_private_pair_matching() {
        let a = UserId::new();
        let b = UserId::new();
        let c = UserId::new();

        let mut chat = chat_at(None);
        chat.participant_ids = vec![a, b];

        assert!(chat.matches_private_pair(&a, &b));
        assert!(chat.matches_private_pair(&b, &a));
        assert!(!chat.matches_private_pair(&a, &c));
        assert_eq!(chat.peer_of(&a), Some(&b));
    }

    #[test]
    fn test_group_chat_has_no_peer() {
        let a = UserId::new();
        let mut chat = chat_at(None);
        chat.kind = ChatKind::Group;
        assert_eq!(chat.peer_of(&a), None);
    }

    #[test]
    fn test_ui_facing_field_names() {
        let message = Message {
            id: MessageId::new(),
            chat_id: ChatId::new(),
            sender_id: UserId::new(),
            content: "salut".to_string(),
            kind: MessageKind::Text,
            sent_at: Utc::now(),
            edited: false,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("senderId").is_some());
        assert!(json.get("sentAt").is_some());
        assert_eq!(json.get("kind").unwrap(), "text");
    }
}
