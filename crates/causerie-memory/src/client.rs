//! Per-client handle: one auth session plus its observers, over the
//! shared hub world.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use causerie_backend::{
    CancelFlag, DocumentStore, IdentityProvider, ProviderIdentity, SnapshotSink, Subscription,
};
use causerie_shared::{
    AuthError, Chat, ChatId, DataAccessError, Message, MessageId, MessageKind, UserId, UserProfile,
};

use crate::hub::MemoryHub;

struct AuthWatcher {
    flag: CancelFlag,
    sink: SnapshotSink<Option<ProviderIdentity>>,
}

impl AuthWatcher {
    fn alive(&self) -> bool {
        !self.flag.is_cancelled() && !self.sink.is_closed()
    }
}

/// One client of the hub, analogous to one browser tab against the
/// hosted backend: its own session, sharing everyone's documents.
#[derive(Clone)]
pub struct MemoryClient {
    hub: MemoryHub,
    session: Arc<Mutex<Option<ProviderIdentity>>>,
    auth_watchers: Arc<Mutex<Vec<AuthWatcher>>>,
    session_tx: Arc<watch::Sender<Option<UserId>>>,
}

impl MemoryClient {
    pub(crate) fn new(hub: MemoryHub) -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            hub,
            session: Arc::new(Mutex::new(None)),
            auth_watchers: Arc::new(Mutex::new(Vec::new())),
            session_tx: Arc::new(session_tx),
        }
    }

    fn establish_session(&self, identity: ProviderIdentity) {
        *lock(&self.session) = Some(identity.clone());
        self.session_tx.send_replace(Some(identity.uid));
        self.notify_auth(Some(identity));
    }

    fn clear_session(&self) {
        *lock(&self.session) = None;
        self.session_tx.send_replace(None);
        self.notify_auth(None);
    }

    fn notify_auth(&self, transition: Option<ProviderIdentity>) {
        let mut watchers = lock(&self.auth_watchers);
        watchers.retain(|w| w.alive());
        for watcher in watchers.iter() {
            let _ = watcher.sink.send(transition.clone());
        }
    }

    fn require_session(&self) -> Result<UserId, DataAccessError> {
        lock(&self.session)
            .as_ref()
            .map(|identity| identity.uid)
            .ok_or_else(|| DataAccessError::PermissionDenied("no active session".to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl IdentityProvider for MemoryClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderIdentity, AuthError> {
        let identity = self.hub.verify_credentials(email, password)?;
        debug!(user = %identity.uid, "Session established");
        self.establish_session(identity.clone());
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<ProviderIdentity, AuthError> {
        let identity = self.hub.register_account(email, password, display_name)?;
        self.establish_session(identity.clone());
        Ok(identity)
    }

    async fn sign_in_federated(&self) -> Result<ProviderIdentity, AuthError> {
        let identity = self.hub.federated_identity()?;
        self.establish_session(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        debug!("Session invalidated");
        self.clear_session();
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if self.hub.account_exists(email) {
            Ok(())
        } else {
            Err(AuthError::Provider("no account for this email".to_string()))
        }
    }

    fn observe_auth_state(&self, sink: SnapshotSink<Option<ProviderIdentity>>) -> Subscription {
        let (sub, flag) = Subscription::new();
        let current = lock(&self.session).clone();
        let _ = sink.send(current);
        lock(&self.auth_watchers).push(AuthWatcher { flag, sink });
        sub
    }
}

#[async_trait]
impl DocumentStore for MemoryClient {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, DataAccessError> {
        self.require_session()?;
        Ok(self.hub.get_user(id))
    }

    async fn upsert_user(&self, profile: &UserProfile) -> Result<(), DataAccessError> {
        let session = self.require_session()?;
        self.hub.upsert_user(&session, profile)
    }

    async fn set_user_presence(&self, id: &UserId, online: bool) -> Result<(), DataAccessError> {
        let session = self.require_session()?;
        self.hub.set_presence(&session, id, online)
    }

    async fn get_online_users(&self) -> Result<Vec<UserProfile>, DataAccessError> {
        self.require_session()?;
        Ok(self.hub.online_users())
    }

    fn subscribe_online_users(
        &self,
        sink: SnapshotSink<Vec<UserProfile>>,
    ) -> Result<Subscription, DataAccessError> {
        self.require_session()?;
        let (sub, flag) = Subscription::new();
        self.hub.subscribe_online(flag, sink);
        Ok(sub)
    }

    async fn create_chat(
        &self,
        participants: &[UserId],
        name: Option<String>,
    ) -> Result<ChatId, DataAccessError> {
        let session = self.require_session()?;
        if !participants.contains(&session) {
            return Err(DataAccessError::PermissionDenied(
                "chat must include the session user".to_string(),
            ));
        }
        Ok(self.hub.create_chat(participants, name))
    }

    async fn find_existing_private_chat(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<ChatId>, DataAccessError> {
        self.require_session()?;
        Ok(self.hub.find_private_chat(a, b))
    }

    async fn get_user_chats(&self, user: &UserId) -> Result<Vec<Chat>, DataAccessError> {
        let session = self.require_session()?;
        if user != &session {
            return Err(DataAccessError::PermissionDenied(
                "cannot list another user's chats".to_string(),
            ));
        }
        Ok(self.hub.user_chats(user))
    }

    fn subscribe_user_chats(
        &self,
        user: &UserId,
        sink: SnapshotSink<Vec<Chat>>,
    ) -> Result<Subscription, DataAccessError> {
        let session = self.require_session()?;
        if user != &session {
            return Err(DataAccessError::PermissionDenied(
                "cannot watch another user's chats".to_string(),
            ));
        }
        let (sub, flag) = Subscription::new();
        self.hub.subscribe_chats(user, flag, sink);
        Ok(sub)
    }

    async fn send_message(
        &self,
        chat: &ChatId,
        sender: &UserId,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageId, DataAccessError> {
        let session = self.require_session()?;
        self.hub.append_message(&session, chat, sender, content, kind)
    }

    async fn get_chat_messages(
        &self,
        chat: &ChatId,
        limit: usize,
    ) -> Result<Vec<Message>, DataAccessError> {
        self.require_session()?;
        Ok(self.hub.chat_messages(chat, limit))
    }

    fn subscribe_chat_messages(
        &self,
        chat: &ChatId,
        sink: SnapshotSink<Vec<Message>>,
    ) -> Result<Subscription, DataAccessError> {
        self.require_session()?;
        let (sub, flag) = Subscription::new();
        self.hub.subscribe_messages(chat, flag, sink);
        Ok(sub)
    }

    async fn session_ready(&self) -> Result<(), DataAccessError> {
        let mut rx = self.session_tx.subscribe();
        loop {
            if rx.borrow_and_update().is_some() {
                return Ok(());
            }
            rx.changed().await.map_err(|_| {
                DataAccessError::Unavailable("session channel closed".to_string())
            })?;
        }
    }
}
