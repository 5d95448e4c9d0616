//! The reconciling store actor.
//!
//! All mutable state lives in a dedicated tokio task.  Intents arrive on
//! a bounded command channel and are processed strictly one at a time;
//! live-feed payloads arrive on an unbounded event channel from small
//! forwarder tasks, each stamped with the generation its subscription
//! was attached under.  Consumers observe the store exclusively through
//! a `watch` channel of immutable [`StoreSnapshot`]s.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use causerie_backend::{DocumentStore, SessionGateway};
use causerie_shared::constants::INTENT_CHANNEL_CAPACITY;
use causerie_shared::{AuthError, Chat, ChatId, ChatKind, Message, MessageKind, UserId, UserProfile};

use crate::error::{Result, StoreError};
use crate::feeds::FeedSlot;
use crate::state::{ActiveTab, SessionStatus, StoreSnapshot, StoreState};

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Intents sent *into* the store task.
enum StoreCommand {
    Login {
        email: String,
        password: String,
        reply: oneshot::Sender<Result<UserProfile>>,
    },
    LoginFederated {
        reply: oneshot::Sender<Result<UserProfile>>,
    },
    SignUp {
        email: String,
        password: String,
        display_name: String,
        reply: oneshot::Sender<Result<UserProfile>>,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    SelectChat {
        chat: Option<ChatId>,
        reply: oneshot::Sender<()>,
    },
    StartChatWith {
        other: UserProfile,
        reply: oneshot::Sender<Result<ChatId>>,
    },
    SendMessage {
        content: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetActiveTab {
        tab: ActiveTab,
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Payloads re-entering the task from subscriptions and probes.
enum FeedEvent {
    /// Resolved provider session transition.
    Auth(Option<UserProfile>),
    OnlineUsers {
        gen: u64,
        users: Vec<UserProfile>,
    },
    Chats {
        gen: u64,
        chats: Vec<Chat>,
    },
    Messages {
        gen: u64,
        chat_id: ChatId,
        messages: Vec<Message>,
    },
    /// The document layer acknowledged the session attached under `gen`.
    SessionReady {
        gen: u64,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running store task.
#[derive(Clone)]
pub struct StoreHandle {
    cmd_tx: mpsc::Sender<StoreCommand>,
    snapshot_rx: watch::Receiver<StoreSnapshot>,
}

impl StoreHandle {
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Login {
            email: email.to_string(),
            password: password.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| StoreError::Stopped)?
    }

    pub async fn login_federated(&self) -> Result<UserProfile> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::LoginFederated { reply }).await?;
        rx.await.map_err(|_| StoreError::Stopped)?
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserProfile> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::SignUp {
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| StoreError::Stopped)?
    }

    /// Tear the session down.  Never fails for auth reasons; the only
    /// error is a stopped store.
    pub async fn logout(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Logout { reply }).await?;
        rx.await.map_err(|_| StoreError::Stopped)
    }

    pub async fn select_chat(&self, chat: Option<ChatId>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::SelectChat { chat, reply }).await?;
        rx.await.map_err(|_| StoreError::Stopped)
    }

    /// Open (creating if needed) the private chat with `other` and
    /// select it.
    pub async fn start_chat_with(&self, other: UserProfile) -> Result<ChatId> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::StartChatWith { other, reply }).await?;
        rx.await.map_err(|_| StoreError::Stopped)?
    }

    /// Send `content` into the selected chat.  Blank content, no
    /// selection, or no session is a silent no-op.  The message becomes
    /// visible once the message subscription re-fires; there is no
    /// optimistic local append.
    pub async fn send_message(&self, content: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::SendMessage {
            content: content.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| StoreError::Stopped)?
    }

    pub async fn set_active_tab(&self, tab: ActiveTab) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::SetActiveTab { tab, reply }).await?;
        rx.await.map_err(|_| StoreError::Stopped)
    }

    /// Stop the store task; all live subscriptions are cancelled.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(StoreCommand::Shutdown).await
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A fresh watcher over published snapshots.
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_rx.clone()
    }

    async fn send(&self, cmd: StoreCommand) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| StoreError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Spawn the store task.
///
/// Registers the process-wide auth-state observer immediately, so an
/// already-established provider session is restored without any login
/// intent.
pub fn spawn_store(gateway: SessionGateway, documents: Arc<dyn DocumentStore>) -> StoreHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<StoreCommand>(INTENT_CHANNEL_CAPACITY);
    let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<FeedEvent>();
    let (snapshot_tx, snapshot_rx) = watch::channel(StoreSnapshot::default());

    let mut task = StoreTask {
        gateway,
        documents,
        state: StoreState::new(),
        snapshot_tx,
        feed_tx,
        gen_counter: 0,
        online_feed: FeedSlot::new(),
        chats_feed: FeedSlot::new(),
        messages_feed: FeedSlot::new(),
        ready_gen: None,
    };

    tokio::spawn(async move {
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let _auth_sub = task.gateway.observe_auth_state(auth_tx);
        task.spawn_forwarder(auth_rx, FeedEvent::Auth);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(StoreCommand::Shutdown) | None => break,
                        Some(cmd) => task.handle_command(cmd).await,
                    }
                }
                event = feed_rx.recv() => {
                    if let Some(event) = event {
                        task.handle_feed(event);
                    }
                }
            }
        }

        task.cancel_all_feeds();
        info!("Store task terminated");
    });

    StoreHandle {
        cmd_tx,
        snapshot_rx,
    }
}

struct StoreTask {
    gateway: SessionGateway,
    documents: Arc<dyn DocumentStore>,
    state: StoreState,
    snapshot_tx: watch::Sender<StoreSnapshot>,
    feed_tx: mpsc::UnboundedSender<FeedEvent>,
    gen_counter: u64,
    online_feed: FeedSlot,
    chats_feed: FeedSlot,
    messages_feed: FeedSlot,
    /// Generation of the outstanding readiness probe, if any.
    ready_gen: Option<u64>,
}

impl StoreTask {
    async fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::Login {
                email,
                password,
                reply,
            } => {
                let result = self
                    .authenticate(|gateway| async move {
                        gateway.sign_in(&email, &password).await
                    })
                    .await;
                let _ = reply.send(result);
            }
            StoreCommand::LoginFederated { reply } => {
                let result = self
                    .authenticate(|gateway| async move { gateway.sign_in_federated().await })
                    .await;
                let _ = reply.send(result);
            }
            StoreCommand::SignUp {
                email,
                password,
                display_name,
                reply,
            } => {
                let result = self
                    .authenticate(|gateway| async move {
                        gateway.sign_up(&email, &password, &display_name).await
                    })
                    .await;
                let _ = reply.send(result);
            }
            StoreCommand::Logout { reply } => {
                self.logout().await;
                let _ = reply.send(());
            }
            StoreCommand::SelectChat { chat, reply } => {
                self.select(chat);
                let _ = reply.send(());
            }
            StoreCommand::StartChatWith { other, reply } => {
                let result = self.start_chat_with(other).await;
                let _ = reply.send(result);
            }
            StoreCommand::SendMessage { content, reply } => {
                let result = self.send_message(content).await;
                let _ = reply.send(result);
            }
            StoreCommand::SetActiveTab { tab, reply } => {
                self.state.active_tab = tab;
                self.publish();
                let _ = reply.send(());
            }
            StoreCommand::Shutdown => unreachable!("handled by the event loop"),
        }
    }

    fn handle_feed(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Auth(transition) => self.handle_auth_transition(transition),
            FeedEvent::OnlineUsers { gen, users } => {
                if self.online_feed.accepts(gen) {
                    self.state.apply_online_users(users);
                    self.publish();
                } else {
                    debug!("Discarding stale online-users snapshot");
                }
            }
            FeedEvent::Chats { gen, chats } => {
                if self.chats_feed.accepts(gen) {
                    self.state.apply_chats(chats);
                    self.publish();
                } else {
                    debug!("Discarding stale chat-list snapshot");
                }
            }
            FeedEvent::Messages {
                gen,
                chat_id,
                messages,
            } => {
                if self.messages_feed.accepts(gen) {
                    self.state.apply_messages(chat_id, messages);
                    self.publish();
                } else {
                    debug!(chat = %chat_id, "Discarding stale message snapshot");
                }
            }
            FeedEvent::SessionReady { gen } => {
                if self.ready_gen == Some(gen) {
                    self.ready_gen = None;
                    self.attach_online_feed();
                } else {
                    debug!("Discarding stale readiness acknowledgment");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Run one gateway auth flow with the shared Authenticating /
    /// SignedIn / SignedOut bookkeeping.
    async fn authenticate<F, Fut>(&mut self, flow: F) -> Result<UserProfile>
    where
        F: FnOnce(SessionGateway) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<UserProfile, AuthError>>,
    {
        self.cancel_all_feeds();
        self.state.clear();
        self.state.status = SessionStatus::Authenticating;
        self.publish();

        match flow(self.gateway.clone()).await {
            Ok(profile) => {
                info!(user = %profile.id, "Signed in");
                self.enter_session(profile.clone());
                Ok(profile)
            }
            Err(e) => {
                self.state.clear();
                self.publish();
                Err(e.into())
            }
        }
    }

    /// Transition to `SignedIn`: attach the chat-list feed and start the
    /// readiness probe that gates the online-users feed.
    fn enter_session(&mut self, profile: UserProfile) {
        self.cancel_all_feeds();
        self.state.clear();
        self.state.status = SessionStatus::SignedIn;
        self.state.profile = Some(profile.clone());
        self.state.chats_loading = true;

        self.attach_chats_feed(profile.id);
        self.spawn_ready_probe();
        self.publish();
    }

    /// Ordering matters here: the profile must be marked offline while
    /// the session still has write permission on it, feeds must be
    /// cancelled before state is cleared (a late snapshot must find
    /// nothing to repopulate), and the provider sign-out comes last.
    /// Both external steps are best-effort; logout always succeeds
    /// locally.
    async fn logout(&mut self) {
        if let Some(profile) = self.state.profile.clone() {
            if let Err(e) = self.documents.set_user_presence(&profile.id, false).await {
                warn!(error = %e, "Failed to mark profile offline before sign-out");
            }
        }

        self.cancel_all_feeds();
        self.state.clear();
        self.publish();

        if let Err(e) = self.gateway.sign_out().await {
            warn!(error = %e, "Provider sign-out failed");
        }
        info!("Signed out");
    }

    /// Provider session transitions, after the gateway resolved them to
    /// profiles.
    fn handle_auth_transition(&mut self, transition: Option<UserProfile>) {
        match transition {
            Some(profile) => {
                let already_current = self.state.status == SessionStatus::SignedIn
                    && self.state.profile.as_ref().map(|p| p.id) == Some(profile.id);
                if already_current {
                    // Echo of a login this task already handled.
                    return;
                }
                info!(user = %profile.id, "Session restored by provider transition");
                self.enter_session(profile);
            }
            None => {
                if self.state.status == SessionStatus::SignedOut {
                    // Echo of a manual logout; cleanup already ran.
                    return;
                }
                info!("Session ended by provider");
                self.cancel_all_feeds();
                self.state.clear();
                self.publish();
            }
        }
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    fn select(&mut self, target: Option<ChatId>) {
        if self.state.status != SessionStatus::SignedIn {
            return;
        }

        self.state.selected = target;
        self.state.messages.clear();
        self.messages_feed.clear();

        if let Some(chat_id) = target {
            self.attach_messages_feed(chat_id);
        }
        self.publish();
    }

    async fn start_chat_with(&mut self, other: UserProfile) -> Result<ChatId> {
        let me = self.state.profile.clone().ok_or(StoreError::NotSignedIn)?;

        let chat_id = match self
            .documents
            .find_existing_private_chat(&me.id, &other.id)
            .await?
        {
            Some(id) => id,
            None => {
                self.documents
                    .create_chat(&[me.id, other.id], None)
                    .await?
            }
        };

        if !self.state.chats.iter().any(|c| c.id == chat_id) {
            self.state.upsert_placeholder(Chat {
                id: chat_id,
                display_name: other.display_name.clone(),
                kind: ChatKind::Private,
                participant_ids: vec![me.id, other.id],
                last_message: None,
                last_message_at: None,
                created_at: Utc::now(),
            });
        }

        self.select(Some(chat_id));
        Ok(chat_id)
    }

    async fn send_message(&mut self, content: String) -> Result<()> {
        let trimmed = content.trim();
        let (sender, chat_id) = match (&self.state.profile, self.state.selected) {
            (Some(profile), Some(chat_id)) if !trimmed.is_empty() => (profile.id, chat_id),
            _ => return Ok(()),
        };

        self.documents
            .send_message(&chat_id, &sender, trimmed, MessageKind::Text)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Feeds
    // ------------------------------------------------------------------

    fn attach_chats_feed(&mut self, user: UserId) {
        let gen = self.next_gen();
        let (tx, rx) = mpsc::unbounded_channel();
        match self.documents.subscribe_user_chats(&user, tx) {
            Ok(sub) => {
                self.chats_feed.attach(gen, sub);
                self.spawn_forwarder(rx, move |chats| FeedEvent::Chats { gen, chats });
            }
            Err(e) => {
                warn!(error = %e, "Failed to subscribe to chat list");
                self.state.chats_loading = false;
            }
        }
    }

    fn attach_online_feed(&mut self) {
        let gen = self.next_gen();
        let (tx, rx) = mpsc::unbounded_channel();
        match self.documents.subscribe_online_users(tx) {
            Ok(sub) => {
                self.online_feed.attach(gen, sub);
                self.spawn_forwarder(rx, move |users| FeedEvent::OnlineUsers { gen, users });
            }
            Err(e) => warn!(error = %e, "Failed to subscribe to online users"),
        }
    }

    fn attach_messages_feed(&mut self, chat_id: ChatId) {
        let gen = self.next_gen();
        let (tx, rx) = mpsc::unbounded_channel();
        match self.documents.subscribe_chat_messages(&chat_id, tx) {
            Ok(sub) => {
                self.messages_feed.attach(gen, sub);
                self.spawn_forwarder(rx, move |messages| FeedEvent::Messages {
                    gen,
                    chat_id,
                    messages,
                });
            }
            Err(e) => warn!(error = %e, chat = %chat_id, "Failed to subscribe to messages"),
        }
    }

    /// Ask the document layer to acknowledge the session; the
    /// online-users feed attaches only once the acknowledgment for the
    /// CURRENT generation arrives.
    fn spawn_ready_probe(&mut self) {
        let gen = self.next_gen();
        self.ready_gen = Some(gen);

        let documents = self.documents.clone();
        let feed = self.feed_tx.clone();
        tokio::spawn(async move {
            match documents.session_ready().await {
                Ok(()) => {
                    let _ = feed.send(FeedEvent::SessionReady { gen });
                }
                Err(e) => warn!(error = %e, "Session readiness probe failed"),
            }
        });
    }

    fn spawn_forwarder<T: Send + 'static>(
        &self,
        mut rx: mpsc::UnboundedReceiver<T>,
        into_event: impl Fn(T) -> FeedEvent + Send + 'static,
    ) {
        let feed = self.feed_tx.clone();
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if feed.send(into_event(payload)).is_err() {
                    break;
                }
            }
        });
    }

    fn cancel_all_feeds(&mut self) {
        self.online_feed.clear();
        self.chats_feed.clear();
        self.messages_feed.clear();
        self.ready_gen = None;
    }

    fn next_gen(&mut self) -> u64 {
        self.gen_counter += 1;
        self.gen_counter
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }
}
