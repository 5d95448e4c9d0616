//! End-to-end store behavior over the in-memory backend: session
//! lifecycle, subscription ownership, cross-stream reconciliation, and
//! the logout ordering rules.

use std::sync::Arc;
use std::time::Duration;

use causerie_backend::SessionGateway;
use causerie_memory::MemoryHub;
use causerie_shared::{MessageKind, UserProfile};
use causerie_store::{spawn_store, ActiveTab, SessionStatus, StoreHandle, StoreSnapshot};

fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Spawn a store over its own client of the shared hub and register an
/// account through it, like a fresh browser completing sign-up.
async fn spawn_user(hub: &MemoryHub, email: &str, name: &str) -> (StoreHandle, UserProfile) {
    trace_init();
    let client = Arc::new(hub.client());
    let gateway = SessionGateway::new(client.clone(), client.clone());
    let handle = spawn_store(gateway, client);
    let profile = handle
        .sign_up(email, "secret1", name)
        .await
        .expect("sign up should succeed");
    (handle, profile)
}

async fn wait_until(
    handle: &StoreHandle,
    what: &str,
    cond: impl Fn(&StoreSnapshot) -> bool,
) -> StoreSnapshot {
    let mut rx = handle.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let hit = {
                let snap = rx.borrow_and_update();
                if cond(&snap) {
                    Some(snap.clone())
                } else {
                    None
                }
            };
            if let Some(snap) = hit {
                return snap;
            }
            rx.changed().await.expect("store task gone");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for: {what}"))
}

#[tokio::test]
async fn test_sign_up_reaches_signed_in_with_chat_list() {
    let hub = MemoryHub::new();
    let (handle, profile) = spawn_user(&hub, "ada@example.org", "Ada").await;

    let snap = wait_until(&handle, "signed-in snapshot", |s| {
        s.status == SessionStatus::SignedIn && !s.chats_loading
    })
    .await;

    assert_eq!(snap.profile.as_ref().map(|p| p.id), Some(profile.id));
    assert!(snap.chats.is_empty());
    assert!(snap.messages.is_empty());
}

#[tokio::test]
async fn test_selection_owns_exactly_one_message_subscription() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (_bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;
    let (_cleo_handle, cleo) = spawn_user(&hub, "cleo@example.org", "Cleo").await;

    let chat_b = ada.start_chat_with(bea).await.unwrap();
    assert_eq!(hub.message_subscription_count(&chat_b), 1);

    let chat_c = ada.start_chat_with(cleo).await.unwrap();
    assert_eq!(hub.message_subscription_count(&chat_b), 0);
    assert_eq!(hub.message_subscription_count(&chat_c), 1);

    ada.select_chat(Some(chat_b)).await.unwrap();
    assert_eq!(hub.message_subscription_count(&chat_b), 1);
    assert_eq!(hub.message_subscription_count(&chat_c), 0);

    ada.select_chat(None).await.unwrap();
    assert_eq!(hub.message_subscription_count(&chat_b), 0);
    assert_eq!(hub.message_subscription_count(&chat_c), 0);

    let snap = ada.snapshot();
    assert!(snap.selected_chat.is_none());
    assert!(snap.messages.is_empty());
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;

    ada.logout().await.unwrap();
    assert_eq!(ada.snapshot().status, SessionStatus::SignedOut);

    ada.logout().await.unwrap();
    assert_eq!(ada.snapshot().status, SessionStatus::SignedOut);
}

#[tokio::test]
async fn test_logout_clears_state_and_late_traffic_stays_out() {
    let hub = MemoryHub::new();
    let (ada, ada_profile) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;

    let chat = ada.start_chat_with(bea).await.unwrap();
    ada.send_message("hi").await.unwrap();
    wait_until(&ada, "own message visible", |s| s.messages.len() == 1).await;

    ada.logout().await.unwrap();
    let cleared = ada.snapshot();
    assert_eq!(cleared.status, SessionStatus::SignedOut);
    assert!(cleared.profile.is_none());
    assert!(cleared.chats.is_empty());
    assert!(cleared.messages.is_empty());
    assert!(cleared.online_users.is_empty());

    // Bea keeps talking into the chat Ada was subscribed to.
    bea_handle
        .select_chat(Some(chat))
        .await
        .unwrap();
    bea_handle.send_message("still there?").await.unwrap();
    wait_until(&bea_handle, "bea sees both messages", |s| s.messages.len() == 2).await;

    // Nothing of that traffic may repopulate Ada's cleared state.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = ada.snapshot();
    assert_eq!(after.status, SessionStatus::SignedOut);
    assert!(after.chats.is_empty());
    assert!(after.messages.is_empty());

    // And the profile went offline before the session was invalidated.
    wait_until(&bea_handle, "bea sees ada offline", |s| {
        s.online_users.iter().all(|u| u.id != ada_profile.id)
    })
    .await;
}

#[tokio::test]
async fn test_start_chat_with_reuses_the_private_chat() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (_bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;

    let first = ada.start_chat_with(bea.clone()).await.unwrap();
    let second = ada.start_chat_with(bea).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(hub.chat_count(), 1);
}

#[tokio::test]
async fn test_placeholder_is_selectable_immediately_and_superseded() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (_bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;

    let chat = ada.start_chat_with(bea).await.unwrap();

    // The intent's reply already reflects a selectable chat, even if the
    // list subscription has not caught up yet.
    let immediate = ada.snapshot();
    assert_eq!(immediate.selected_chat, Some(chat));
    assert!(immediate.chats.iter().any(|c| c.id == chat));

    // The authoritative snapshot supersedes the placeholder, exactly one
    // entry either way.
    let settled = wait_until(&ada, "resolved chat name", |s| {
        s.chats.iter().any(|c| c.id == chat && c.display_name == "Bea")
    })
    .await;
    assert_eq!(settled.chats.iter().filter(|c| c.id == chat).count(), 1);
}

#[tokio::test]
async fn test_chat_list_reorders_when_older_chat_gets_a_message() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (_bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;
    let (_cleo_handle, cleo) = spawn_user(&hub, "cleo@example.org", "Cleo").await;

    let chat_b = ada.start_chat_with(bea).await.unwrap();
    ada.send_message("first").await.unwrap();

    let chat_c = ada.start_chat_with(cleo).await.unwrap();
    ada.send_message("second").await.unwrap();

    wait_until(&ada, "newest chat first", |s| {
        s.chats.len() == 2 && s.chats[0].id == chat_c && s.chats[1].id == chat_b
    })
    .await;

    // A message into the older chat moves it back to the top.
    ada.select_chat(Some(chat_b)).await.unwrap();
    ada.send_message("third").await.unwrap();

    wait_until(&ada, "older chat reordered first", |s| {
        s.chats.len() == 2 && s.chats[0].id == chat_b && s.chats[1].id == chat_c
    })
    .await;
}

#[tokio::test]
async fn test_two_clients_converge_on_the_same_message() {
    let hub = MemoryHub::new();
    let (ada, ada_profile) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;

    let chat = ada.start_chat_with(bea).await.unwrap();
    ada.send_message("hi").await.unwrap();

    let ada_view = wait_until(&ada, "ada sees her message", |s| s.messages.len() == 1).await;
    assert_eq!(ada_view.messages[0].sender_id, ada_profile.id);
    assert_eq!(ada_view.messages[0].content, "hi");
    assert_eq!(ada_view.messages[0].kind, MessageKind::Text);

    // Bea's chat list catches up, she opens the chat, and sees the same
    // single message.
    wait_until(&bea_handle, "bea's list shows the chat", |s| {
        s.chats.iter().any(|c| c.id == chat)
    })
    .await;
    bea_handle.select_chat(Some(chat)).await.unwrap();

    let bea_view = wait_until(&bea_handle, "bea sees the message", |s| s.messages.len() == 1).await;
    assert_eq!(bea_view.messages[0].sender_id, ada_profile.id);
    assert_eq!(bea_view.messages[0].content, "hi");
}

#[tokio::test]
async fn test_online_list_excludes_self() {
    let hub = MemoryHub::new();
    let (ada, ada_profile) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (bea_handle, bea_profile) = spawn_user(&hub, "bea@example.org", "Bea").await;

    let ada_view = wait_until(&ada, "ada's online list", |s| s.online_users.len() == 1).await;
    assert_eq!(ada_view.online_users[0].id, bea_profile.id);

    let bea_view = wait_until(&bea_handle, "bea's online list", |s| s.online_users.len() == 1).await;
    assert_eq!(bea_view.online_users[0].id, ada_profile.id);
}

#[tokio::test]
async fn test_peer_goes_offline_after_logout() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (bea_handle, _) = spawn_user(&hub, "bea@example.org", "Bea").await;

    wait_until(&bea_handle, "bea sees ada online", |s| s.online_users.len() == 1).await;

    ada.logout().await.unwrap();

    wait_until(&bea_handle, "bea sees ada offline", |s| s.online_users.is_empty()).await;
}

#[tokio::test]
async fn test_blank_send_is_a_silent_noop() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (_bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;

    let chat = ada.start_chat_with(bea).await.unwrap();
    ada.send_message("   ").await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hub.message_count(&chat), 0);
}

#[tokio::test]
async fn test_send_without_selection_is_a_silent_noop() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;

    ada.send_message("into the void").await.unwrap();
    assert_eq!(hub.chat_count(), 0);
}

#[tokio::test]
async fn test_provider_replay_restores_a_second_store() {
    let hub = MemoryHub::new();
    let client = Arc::new(hub.client());
    let first = spawn_store(
        SessionGateway::new(client.clone(), client.clone()),
        client.clone(),
    );
    let profile = first
        .sign_up("ada@example.org", "secret1", "Ada")
        .await
        .unwrap();

    // A second store over the same client session signs in purely from
    // the observer replay, with no login intent.
    let second = spawn_store(
        SessionGateway::new(client.clone(), client.clone()),
        client.clone(),
    );

    let snap = wait_until(&second, "restored session", |s| {
        s.status == SessionStatus::SignedIn
    })
    .await;
    assert_eq!(snap.profile.as_ref().map(|p| p.id), Some(profile.id));
}

#[tokio::test]
async fn test_federated_login_reaches_signed_in() {
    let hub = MemoryHub::new();
    hub.seed_federated_account("ada@example.org", "Ada");

    let client = Arc::new(hub.client());
    let handle = spawn_store(
        SessionGateway::new(client.clone(), client.clone()),
        client,
    );

    let profile = handle.login_federated().await.unwrap();
    assert_eq!(profile.display_name, "Ada");
    assert_eq!(handle.snapshot().status, SessionStatus::SignedIn);
}

#[tokio::test]
async fn test_active_tab_follows_intents_and_resets_on_logout() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;

    assert_eq!(ada.snapshot().active_tab, ActiveTab::Chats);

    ada.set_active_tab(ActiveTab::Users).await.unwrap();
    assert_eq!(ada.snapshot().active_tab, ActiveTab::Users);

    ada.logout().await.unwrap();
    assert_eq!(ada.snapshot().active_tab, ActiveTab::Chats);
}

#[tokio::test]
async fn test_failed_login_returns_to_signed_out() {
    let hub = MemoryHub::new();
    let client = Arc::new(hub.client());
    let handle = spawn_store(
        SessionGateway::new(client.clone(), client.clone()),
        client,
    );

    let result = handle.login("nobody@example.org", "wrong").await;
    assert!(result.is_err());
    assert_eq!(handle.snapshot().status, SessionStatus::SignedOut);
}

#[tokio::test]
async fn test_shutdown_cancels_every_live_subscription() {
    let hub = MemoryHub::new();
    let (ada, _) = spawn_user(&hub, "ada@example.org", "Ada").await;
    let (_bea_handle, bea) = spawn_user(&hub, "bea@example.org", "Bea").await;

    let chat = ada.start_chat_with(bea).await.unwrap();
    wait_until(&ada, "online feed attached", |s| !s.online_users.is_empty()).await;

    ada.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(hub.message_subscription_count(&chat), 0);
    // Only Bea's store still watches chats and presence.
    assert_eq!(hub.chat_subscription_count(), 1);
    assert_eq!(hub.online_subscription_count(), 1);
}
