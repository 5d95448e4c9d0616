//! The shared world behind every [`MemoryClient`]: account registry,
//! document collections, and live-query fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use causerie_backend::{CancelFlag, ProviderIdentity, SnapshotSink};
use causerie_shared::constants::UNKNOWN_USER_NAME;
use causerie_shared::{
    sort_chats, AuthError, Chat, ChatId, ChatKind, DataAccessError, Message, MessageId,
    MessageKind, UserId, UserProfile,
};

use crate::client::MemoryClient;

// ---------------------------------------------------------------------------
// Internal documents
// ---------------------------------------------------------------------------

struct Account {
    uid: UserId,
    /// `None` for federated accounts, which carry no password.
    password: Option<String>,
    display_name: String,
}

struct ChatDoc {
    id: ChatId,
    kind: ChatKind,
    name: Option<String>,
    participants: Vec<UserId>,
    created_at: DateTime<Utc>,
    last_message: Option<Message>,
    last_message_at: Option<DateTime<Utc>>,
}

/// A registered live query.  Pruned once cancelled or once the receiving
/// side is gone.
struct Watcher<T> {
    flag: CancelFlag,
    sink: SnapshotSink<T>,
}

impl<T> Watcher<T> {
    fn alive(&self) -> bool {
        !self.flag.is_cancelled() && !self.sink.is_closed()
    }

    fn deliver(&self, snapshot: T) {
        if self.alive() {
            let _ = self.sink.send(snapshot);
        }
    }
}

struct World {
    accounts: HashMap<String, Account>,
    federated_email: Option<String>,
    users: HashMap<UserId, UserProfile>,
    /// Creation order, so pair lookups return the first match.
    chats: Vec<ChatDoc>,
    messages: HashMap<ChatId, Vec<Message>>,
    online_watchers: Vec<Watcher<Vec<UserProfile>>>,
    chat_watchers: Vec<(UserId, Watcher<Vec<Chat>>)>,
    message_watchers: Vec<(ChatId, Watcher<Vec<Message>>)>,
}

impl World {
    fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            federated_email: None,
            users: HashMap::new(),
            chats: Vec::new(),
            messages: HashMap::new(),
            online_watchers: Vec::new(),
            chat_watchers: Vec::new(),
            message_watchers: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// One in-process backend world, shared by any number of clients.
#[derive(Clone)]
pub struct MemoryHub {
    world: Arc<Mutex<World>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            world: Arc::new(Mutex::new(World::new())),
        }
    }

    /// Mint a client with its own auth session, sharing this world.
    pub fn client(&self) -> MemoryClient {
        MemoryClient::new(self.clone())
    }

    /// Seed the account that every client's federated sign-in resolves
    /// to.  Without a seed, federated sign-in fails as a cancelled flow.
    pub fn seed_federated_account(&self, email: &str, display_name: &str) -> UserId {
        let mut world = self.world();
        let uid = UserId::new();
        world.accounts.insert(
            email.to_string(),
            Account {
                uid,
                password: None,
                display_name: display_name.to_string(),
            },
        );
        world.federated_email = Some(email.to_string());
        uid
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub(crate) fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderIdentity, AuthError> {
        let world = self.world();
        let account = world
            .accounts
            .get(email)
            .ok_or(AuthError::InvalidCredentials)?;
        if account.password.as_deref() != Some(password) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(identity_for(email, account))
    }

    pub(crate) fn register_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<ProviderIdentity, AuthError> {
        let mut world = self.world();
        if world.accounts.contains_key(email) {
            return Err(AuthError::AccountExists);
        }
        let account = Account {
            uid: UserId::new(),
            password: Some(password.to_string()),
            display_name: display_name.to_string(),
        };
        let identity = identity_for(email, &account);
        world.accounts.insert(email.to_string(), account);
        Ok(identity)
    }

    pub(crate) fn federated_identity(&self) -> Result<ProviderIdentity, AuthError> {
        let world = self.world();
        let email = world
            .federated_email
            .clone()
            .ok_or(AuthError::FlowCancelled)?;
        let account = world
            .accounts
            .get(&email)
            .ok_or(AuthError::FlowCancelled)?;
        Ok(identity_for(&email, account))
    }

    pub(crate) fn account_exists(&self, email: &str) -> bool {
        self.world().accounts.contains_key(email)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub(crate) fn get_user(&self, id: &UserId) -> Option<UserProfile> {
        self.world().users.get(id).cloned()
    }

    pub(crate) fn upsert_user(
        &self,
        session: &UserId,
        profile: &UserProfile,
    ) -> Result<(), DataAccessError> {
        if profile.id != *session {
            return Err(DataAccessError::PermissionDenied(
                "cannot write another user's profile".to_string(),
            ));
        }
        let mut world = self.world();
        world.users.insert(profile.id, profile.clone());
        notify_online(&mut world);
        notify_chats(&mut world);
        Ok(())
    }

    pub(crate) fn set_presence(
        &self,
        session: &UserId,
        id: &UserId,
        online: bool,
    ) -> Result<(), DataAccessError> {
        if id != session {
            return Err(DataAccessError::PermissionDenied(
                "cannot write another user's presence".to_string(),
            ));
        }
        let mut world = self.world();
        let profile = world
            .users
            .get_mut(id)
            .ok_or_else(|| DataAccessError::NotFound(format!("user {id}")))?;
        profile.is_online = online;
        profile.last_seen = Utc::now();
        notify_online(&mut world);
        Ok(())
    }

    pub(crate) fn online_users(&self) -> Vec<UserProfile> {
        online_snapshot(&self.world())
    }

    pub(crate) fn subscribe_online(&self, flag: CancelFlag, sink: SnapshotSink<Vec<UserProfile>>) {
        let mut world = self.world();
        let watcher = Watcher { flag, sink };
        watcher.deliver(online_snapshot(&world));
        world.online_watchers.push(watcher);
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    pub(crate) fn create_chat(&self, participants: &[UserId], name: Option<String>) -> ChatId {
        let mut unique: Vec<UserId> = Vec::new();
        for id in participants {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let kind = if unique.len() == 2 && name.is_none() {
            ChatKind::Private
        } else {
            ChatKind::Group
        };

        let doc = ChatDoc {
            id: ChatId::new(),
            kind,
            name: name.filter(|n| !n.trim().is_empty()),
            participants: unique,
            created_at: Utc::now(),
            last_message: None,
            last_message_at: None,
        };
        let id = doc.id;

        let mut world = self.world();
        world.chats.push(doc);
        notify_chats(&mut world);
        debug!(chat = %id, "Created chat");
        id
    }

    pub(crate) fn find_private_chat(&self, a: &UserId, b: &UserId) -> Option<ChatId> {
        self.world()
            .chats
            .iter()
            .find(|doc| {
                doc.kind == ChatKind::Private
                    && doc.participants.contains(a)
                    && doc.participants.contains(b)
            })
            .map(|doc| doc.id)
    }

    pub(crate) fn user_chats(&self, user: &UserId) -> Vec<Chat> {
        chats_snapshot(&self.world(), user)
    }

    pub(crate) fn subscribe_chats(
        &self,
        user: &UserId,
        flag: CancelFlag,
        sink: SnapshotSink<Vec<Chat>>,
    ) {
        let mut world = self.world();
        let watcher = Watcher { flag, sink };
        watcher.deliver(chats_snapshot(&world, user));
        world.chat_watchers.push((*user, watcher));
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Append a message and update the parent chat's preview under one
    /// lock: readers can never observe the append without the preview.
    pub(crate) fn append_message(
        &self,
        session: &UserId,
        chat: &ChatId,
        sender: &UserId,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageId, DataAccessError> {
        if sender != session {
            return Err(DataAccessError::PermissionDenied(
                "cannot send as another user".to_string(),
            ));
        }

        let mut world = self.world();
        let doc = world
            .chats
            .iter_mut()
            .find(|doc| doc.id == *chat)
            .ok_or_else(|| DataAccessError::NotFound(format!("chat {chat}")))?;

        let message = Message {
            id: MessageId::new(),
            chat_id: *chat,
            sender_id: *sender,
            content: content.to_string(),
            kind,
            sent_at: Utc::now(),
            edited: false,
        };
        doc.last_message = Some(message.clone());
        doc.last_message_at = Some(message.sent_at);

        let id = message.id;
        let log = world.messages.entry(*chat).or_default();
        log.push(message);
        // Stable sort: equal timestamps keep arrival order.
        log.sort_by_key(|m| m.sent_at);

        notify_messages(&mut world, chat);
        notify_chats(&mut world);
        Ok(id)
    }

    pub(crate) fn chat_messages(&self, chat: &ChatId, limit: usize) -> Vec<Message> {
        let world = self.world();
        let log = messages_snapshot(&world, chat);
        let skip = log.len().saturating_sub(limit);
        log[skip..].to_vec()
    }

    pub(crate) fn subscribe_messages(
        &self,
        chat: &ChatId,
        flag: CancelFlag,
        sink: SnapshotSink<Vec<Message>>,
    ) {
        let mut world = self.world();
        let watcher = Watcher { flag, sink };
        watcher.deliver(messages_snapshot(&world, chat));
        world.message_watchers.push((*chat, watcher));
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Number of live message subscriptions for a chat.
    pub fn message_subscription_count(&self, chat: &ChatId) -> usize {
        let mut world = self.world();
        world.message_watchers.retain(|(_, w)| w.alive());
        world
            .message_watchers
            .iter()
            .filter(|(id, _)| id == chat)
            .count()
    }

    /// Number of live chat-list subscriptions, across all users.
    pub fn chat_subscription_count(&self) -> usize {
        let mut world = self.world();
        world.chat_watchers.retain(|(_, w)| w.alive());
        world.chat_watchers.len()
    }

    /// Number of live online-user subscriptions.
    pub fn online_subscription_count(&self) -> usize {
        let mut world = self.world();
        world.online_watchers.retain(|w| w.alive());
        world.online_watchers.len()
    }

    pub fn message_count(&self, chat: &ChatId) -> usize {
        self.world().messages.get(chat).map_or(0, |log| log.len())
    }

    pub fn chat_count(&self) -> usize {
        self.world().chats.len()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

fn identity_for(email: &str, account: &Account) -> ProviderIdentity {
    ProviderIdentity {
        uid: account.uid,
        display_name: Some(account.display_name.clone()),
        email: Some(email.to_string()),
        photo_url: None,
    }
}

// ---------------------------------------------------------------------------
// Snapshots and fan-out
// ---------------------------------------------------------------------------

fn online_snapshot(world: &World) -> Vec<UserProfile> {
    let mut users: Vec<UserProfile> = world
        .users
        .values()
        .filter(|u| u.is_online)
        .cloned()
        .collect();
    users.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
    users
}

fn chats_snapshot(world: &World, viewer: &UserId) -> Vec<Chat> {
    let mut chats: Vec<Chat> = world
        .chats
        .iter()
        .filter(|doc| doc.participants.contains(viewer))
        .map(|doc| resolve_chat(world, doc, viewer))
        .collect();
    sort_chats(&mut chats);
    chats
}

fn messages_snapshot(world: &World, chat: &ChatId) -> Vec<Message> {
    world.messages.get(chat).cloned().unwrap_or_default()
}

/// Materialize a chat for a viewer, resolving the display name the way
/// the hosted backend's query layer does: explicit name, else the other
/// private participant's profile name.
fn resolve_chat(world: &World, doc: &ChatDoc, viewer: &UserId) -> Chat {
    let display_name = match &doc.name {
        Some(name) => name.clone(),
        None if doc.kind == ChatKind::Private => doc
            .participants
            .iter()
            .find(|id| *id != viewer)
            .and_then(|peer| world.users.get(peer))
            .map(|profile| profile.display_name.clone())
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string()),
        None => "Unnamed Chat".to_string(),
    };

    Chat {
        id: doc.id,
        display_name,
        kind: doc.kind,
        participant_ids: doc.participants.clone(),
        last_message: doc.last_message.clone(),
        last_message_at: doc.last_message_at,
        created_at: doc.created_at,
    }
}

fn notify_online(world: &mut World) {
    world.online_watchers.retain(|w| w.alive());
    let snapshot = online_snapshot(world);
    for watcher in &world.online_watchers {
        watcher.deliver(snapshot.clone());
    }
}

fn notify_chats(world: &mut World) {
    world.chat_watchers.retain(|(_, w)| w.alive());
    let viewers: Vec<UserId> = world.chat_watchers.iter().map(|(uid, _)| *uid).collect();
    let snapshots: Vec<Vec<Chat>> = viewers
        .iter()
        .map(|uid| chats_snapshot(world, uid))
        .collect();
    for ((_, watcher), snapshot) in world.chat_watchers.iter().zip(snapshots) {
        watcher.deliver(snapshot);
    }
}

fn notify_messages(world: &mut World, chat: &ChatId) {
    world.message_watchers.retain(|(_, w)| w.alive());
    let snapshot = messages_snapshot(world, chat);
    for (id, watcher) in &world.message_watchers {
        if id == chat {
            watcher.deliver(snapshot.clone());
        }
    }
}
