use std::sync::Arc;
use std::time::Duration;

use anubis_core::error::{AuthError, SyncError, ValidationError};
use anubis_core::workspace::DEFAULT_SERVER_NAME;
use anubis_core::{
    ChatService, ClientError, SessionState, SyncConfig, UpdateOutcome, Workspace, WorkspaceUpdate,
};
use anubis_testkit::{MemoryService, Op};
use anubis_types::api::{Credentials, RegisterRequest};
use anubis_types::models::{ChannelKind, PresenceStatus};

fn credentials(login: &str, password: &str) -> Credentials {
    Credentials {
        login: login.to_string(),
        password: password.to_string(),
    }
}

fn workspace(service: &MemoryService) -> Workspace {
    Workspace::new(Arc::new(service.clone()), SyncConfig::default())
}

#[tokio::test]
async fn first_sign_in_creates_a_default_server() {
    let service = MemoryService::new();
    let me = service.add_user("neo", "neo@matrix.io", "secret1");
    let mut ws = workspace(&service);

    let session = ws.sign_in(&credentials("neo", "secret1")).await.unwrap();
    assert_eq!(session.account_id, me);

    assert_eq!(ws.servers().len(), 1);
    assert_eq!(ws.current_server().unwrap().name, DEFAULT_SERVER_NAME);
    assert_eq!(ws.sync().state(), SessionState::Live);
    assert_eq!(service.status_of(&me), Some(PresenceStatus::Online));
}

#[tokio::test]
async fn registered_account_opens_its_first_text_channel() {
    let service = MemoryService::new();
    service
        .register_account(&RegisterRequest {
            username: "Morpheus".into(),
            email: "morpheus@matrix.io".into(),
            password: "secret1".into(),
        })
        .await
        .unwrap();
    let mut ws = workspace(&service);

    ws.sign_in(&credentials("morpheus@matrix.io", "secret1"))
        .await
        .unwrap();

    assert_eq!(ws.current_server().unwrap().name, "Morpheus's Server");
    assert_eq!(ws.channels().len(), 3);
    let active = ws.sync().active_channel().unwrap();
    let channel = ws.channels().iter().find(|c| &c.id == active).unwrap();
    assert_eq!(channel.name, "general");
    assert_eq!(channel.kind, ChannelKind::Text);
}

#[tokio::test]
async fn credential_failures_are_reported_verbatim() {
    let service = MemoryService::new();
    let id = service.add_user("neo", "neo@matrix.io", "secret1");
    let mut ws = workspace(&service);

    let err = ws.sign_in(&credentials("neo", "wrong")).await.unwrap_err();
    assert_eq!(err, ClientError::Auth(AuthError::WrongPassword));

    let err = ws.sign_in(&credentials("smith", "secret1")).await.unwrap_err();
    assert_eq!(err.to_string(), "User not found");

    service.disable_user(&id);
    let err = ws.sign_in(&credentials("neo", "secret1")).await.unwrap_err();
    assert_eq!(err.to_string(), "Account is disabled");
    assert!(ws.session().is_none());
}

#[tokio::test]
async fn server_list_failure_is_a_sync_error() {
    let service = MemoryService::new();
    let me = service.add_user("neo", "neo@matrix.io", "secret1");
    service.fail(Op::ListServers);
    let mut ws = workspace(&service);

    let err = ws.sign_in(&credentials("neo", "secret1")).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Sync(SyncError::Directory { what: "servers", .. })
    ));

    // Half a sign-in is rolled back.
    assert!(ws.session().is_none());
    assert!(ws.roster().is_empty());
    assert_eq!(service.presence_subscribers(), 0);
    assert_eq!(service.status_of(&me), Some(PresenceStatus::Offline));
}

#[tokio::test]
async fn signed_in_account_is_on_the_roster_at_once() {
    let service = MemoryService::new();
    let me = service.add_user("neo", "neo@matrix.io", "secret1");
    service.add_user("trinity", "trinity@matrix.io", "secret1");
    let mut ws = workspace(&service);

    ws.sign_in(&credentials("neo", "secret1")).await.unwrap();

    assert_eq!(ws.online_count(), 1);
    assert_eq!(ws.roster().len(), 2);
    let mine = ws.roster().iter().find(|u| u.id == me).unwrap();
    assert_eq!(mine.status, PresenceStatus::Online);
    assert_eq!(service.presence_subscribers(), 1);
}

#[tokio::test]
async fn presence_changes_update_the_roster() {
    let service = MemoryService::new();
    service.add_user("neo", "neo@matrix.io", "secret1");
    let other = service.add_user("trinity", "trinity@matrix.io", "secret1");
    let mut ws = workspace(&service);
    ws.sign_in(&credentials("neo", "secret1")).await.unwrap();
    assert_eq!(ws.online_count(), 1);

    service.set_status(&other, PresenceStatus::Online);

    assert_eq!(ws.next_update().await, WorkspaceUpdate::Presence { online: 2 });
    assert_eq!(ws.roster().len(), 2);
}

#[tokio::test]
async fn creating_a_server_switches_to_it() {
    let service = MemoryService::new();
    service.add_user("neo", "neo@matrix.io", "secret1");
    let mut ws = workspace(&service);
    ws.sign_in(&credentials("neo", "secret1")).await.unwrap();

    let err = ws.create_server("   ", None).await.unwrap_err();
    assert_eq!(
        err,
        ClientError::Validation(ValidationError::MissingField("Server name"))
    );

    let id = ws.create_server("Nebuchadnezzar", Some("ship.png")).await.unwrap();
    assert_eq!(ws.servers().len(), 2);
    assert_eq!(ws.current_server().unwrap().id, id);
    assert_eq!(ws.current_server().unwrap().icon.as_deref(), Some("ship.png"));
    assert_eq!(ws.sync().state(), SessionState::Live);
}

#[tokio::test]
async fn created_channel_appears_in_the_list() {
    let service = MemoryService::new();
    service.add_user("neo", "neo@matrix.io", "secret1");
    let mut ws = workspace(&service);
    ws.sign_in(&credentials("neo", "secret1")).await.unwrap();

    let voice = ws.create_channel("Lounge", ChannelKind::Voice).await.unwrap();
    let text = ws.create_channel("ops", ChannelKind::Text).await.unwrap();

    assert!(ws.channels().iter().any(|c| c.id == voice && c.kind == ChannelKind::Voice));
    ws.open_channel(&text).await.unwrap();
    assert_eq!(ws.sync().active_channel(), Some(&text));
}

#[tokio::test]
async fn send_goes_to_the_active_channel_and_echo_is_reconciled() {
    let service = MemoryService::new();
    service.add_user("neo", "neo@matrix.io", "secret1");
    let mut ws = workspace(&service);
    ws.sign_in(&credentials("neo", "secret1")).await.unwrap();
    let channel = ws.sync().active_channel().cloned().unwrap();

    let id = ws.send("hello zion").await.unwrap();
    service.republish(&channel);

    assert_eq!(
        ws.next_update().await,
        WorkspaceUpdate::Messages(UpdateOutcome::Rendered)
    );
    let shown = ws.sync().messages();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].id, id);
}

#[tokio::test]
async fn sign_out_marks_offline_and_releases_every_feed() {
    let service = MemoryService::new();
    let me = service.add_user("neo", "neo@matrix.io", "secret1");
    let mut ws = workspace(&service);
    ws.sign_in(&credentials("neo", "secret1")).await.unwrap();

    ws.sign_out().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(ws.session().is_none());
    assert!(ws.servers().is_empty());
    assert_eq!(ws.sync().state(), SessionState::Idle);
    assert_eq!(service.status_of(&me), Some(PresenceStatus::Offline));
    assert!(service.active_subscriptions().is_empty());

    let err = ws.send("anyone?").await.unwrap_err();
    assert!(matches!(err, ClientError::Sync(_)));
}
