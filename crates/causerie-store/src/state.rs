//! The store's state container and snapshot reconciliation.
//!
//! Everything here is pure data manipulation: the actor in
//! [`crate::store`] decides WHEN a payload may be applied (generation
//! checks, session transitions), these methods decide WHAT applying it
//! means.

use std::collections::HashMap;

use serde::Serialize;

use causerie_shared::{sort_chats, Chat, ChatId, Message, UserProfile};

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    SignedOut,
    Authenticating,
    SignedIn,
}

/// Which sidebar list the UI is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActiveTab {
    #[default]
    Chats,
    Users,
}

/// Immutable view published to consumers after every mutation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub status: SessionStatus,
    pub profile: Option<UserProfile>,
    pub active_tab: ActiveTab,
    pub selected_chat: Option<ChatId>,
    pub online_users: Vec<UserProfile>,
    pub chats: Vec<Chat>,
    /// The selected chat's ordered messages; empty when nothing is
    /// selected or the subscription has not fired yet.
    pub messages: Vec<Message>,
    pub chats_loading: bool,
}

/// Mutable state owned by the store actor.
#[derive(Default)]
pub struct StoreState {
    pub status: SessionStatus,
    pub profile: Option<UserProfile>,
    pub active_tab: ActiveTab,
    pub selected: Option<ChatId>,
    pub online_users: Vec<UserProfile>,
    pub chats: Vec<Chat>,
    pub messages: Vec<Message>,
    pub chats_loading: bool,
    /// Best message preview observed per chat across ALL streams, so a
    /// chat-list snapshot arriving with a stale preview never regresses
    /// what the message feed already showed.
    observed_previews: HashMap<ChatId, Message>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the signed-out baseline.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Apply an online-users snapshot, dropping the session's own
    /// identity from the list.
    pub fn apply_online_users(&mut self, mut users: Vec<UserProfile>) {
        let me = self.profile.as_ref().map(|p| p.id);
        users.retain(|user| Some(user.id) != me);
        self.online_users = users;
    }

    /// Apply a chat-list snapshot.
    ///
    /// Locally observed previews win over stale server previews (maximum
    /// `sent_at`), and a selected chat missing from the snapshot (a
    /// placeholder the list subscription has not caught up with) is
    /// carried over until a snapshot contains it.
    pub fn apply_chats(&mut self, mut chats: Vec<Chat>) {
        for chat in &mut chats {
            if let Some(preview) = self.observed_previews.get(&chat.id) {
                if chat.last_message_at < Some(preview.sent_at) {
                    chat.last_message = Some(preview.clone());
                    chat.last_message_at = Some(preview.sent_at);
                }
            }
        }

        if let Some(selected) = self.selected {
            if !chats.iter().any(|c| c.id == selected) {
                if let Some(existing) = self.chats.iter().find(|c| c.id == selected) {
                    chats.push(existing.clone());
                }
            }
        }

        sort_chats(&mut chats);
        self.chats = chats;
        self.chats_loading = false;
    }

    /// Apply a message snapshot for a chat: replace the selected view
    /// and refresh that chat's list preview.
    pub fn apply_messages(&mut self, chat_id: ChatId, messages: Vec<Message>) {
        if let Some(last) = messages.last() {
            let newer = self
                .observed_previews
                .get(&chat_id)
                .map_or(true, |prev| last.sent_at >= prev.sent_at);
            if newer {
                self.observed_previews.insert(chat_id, last.clone());
                if let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) {
                    if chat.last_message_at < Some(last.sent_at) {
                        chat.last_message = Some(last.clone());
                        chat.last_message_at = Some(last.sent_at);
                    }
                }
                sort_chats(&mut self.chats);
            }
        }

        if self.selected == Some(chat_id) {
            self.messages = messages;
        }
    }

    /// Insert a locally synthesized chat so it is selectable before the
    /// list subscription catches up.  The next snapshot supersedes it.
    pub fn upsert_placeholder(&mut self, chat: Chat) {
        if !self.chats.iter().any(|c| c.id == chat.id) {
            self.chats.push(chat);
            sort_chats(&mut self.chats);
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            status: self.status,
            profile: self.profile.clone(),
            active_tab: self.active_tab,
            selected_chat: self.selected,
            online_users: self.online_users.clone(),
            chats: self.chats.clone(),
            messages: self.messages.clone(),
            chats_loading: self.chats_loading,
        }
    }
}
