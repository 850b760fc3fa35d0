//! Login, token refresh and logout against an in-memory relay

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use boxchat_core::sync::{event_channel, ChatEvent};
use boxchat_core::{AuthSession, ChatError, RelayApi};
use common::{keypair, MockRelay};

fn session(relay: &Arc<MockRelay>) -> (AuthSession, tokio::sync::broadcast::Sender<ChatEvent>) {
    let events = event_channel();
    let api: Arc<dyn RelayApi> = relay.clone();
    (AuthSession::new(api, events.clone()), events)
}

#[tokio::test]
async fn test_login_installs_identity_and_token() {
    let relay = MockRelay::new();
    let (session, events) = session(&relay);
    let mut rx = events.subscribe();

    let token = session.login(keypair(1)).await.unwrap();
    assert_eq!(token, "token-1");
    assert_eq!(session.token().as_deref(), Some("token-1"));
    assert_eq!(session.public_key_hex(), Some(keypair(1).public_key_hex()));
    assert_eq!(relay.auth_calls(), 1);

    match rx.try_recv().unwrap() {
        ChatEvent::LoggedIn { public_key } => assert_eq!(public_key, keypair(1).public_key_hex()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_login_logs_out() {
    let relay = MockRelay::new();
    relay.set_reject_login(true);
    let (session, _events) = session(&relay);

    let err = session.login(keypair(1)).await.unwrap_err();
    assert!(err.is_auth());
    assert!(!session.is_logged_in());
    assert!(session.token().is_none());
}

#[tokio::test]
async fn test_unreachable_login_keeps_identity() {
    let relay = MockRelay::new();
    relay.set_reachable(false);
    let (session, _events) = session(&relay);

    let err = session.login(keypair(1)).await.unwrap_err();
    assert!(err.is_network());
    assert!(session.is_logged_in());
    assert!(session.token().is_none());

    // The first request once the relay is back fetches the token
    relay.set_reachable(true);
    let token = session.current_token().await.unwrap();
    assert_eq!(token, "token-1");
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let relay = MockRelay::new();
    let (session, _events) = session(&relay);
    session.login(keypair(1)).await.unwrap();

    relay.revoke_tokens();
    relay.set_auth_delay(Duration::from_millis(100));

    let api: Arc<dyn RelayApi> = relay.clone();
    let calls = (0..5).map(|_| {
        let api = api.clone();
        let session = &session;
        async move {
            session
                .call(|token| {
                    let api = api.clone();
                    async move { api.fetch_messages(&token).await }
                })
                .await
        }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    // One login plus exactly one refresh
    assert_eq!(relay.auth_calls(), 2);
    assert_eq!(session.token().as_deref(), Some("token-2"));
}

#[tokio::test]
async fn test_refresh_rejected_logs_out() {
    let relay = MockRelay::new();
    let (session, events) = session(&relay);
    session.login(keypair(1)).await.unwrap();
    let mut rx = events.subscribe();

    relay.revoke_tokens();
    relay.set_reject_login(true);

    let api: Arc<dyn RelayApi> = relay.clone();
    let err = session
        .call(|token| {
            let api = api.clone();
            async move { api.fetch_messages(&token).await }
        })
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(!session.is_logged_in());
    assert!(matches!(rx.try_recv().unwrap(), ChatEvent::LoggedOut));

    let err = session.current_token().await.unwrap_err();
    assert!(matches!(err, ChatError::NotAuthenticated));
}

#[tokio::test]
async fn test_generation_advances_on_identity_change() {
    let relay = MockRelay::new();
    let (session, _events) = session(&relay);

    let start = session.generation();
    session.login(keypair(1)).await.unwrap();
    let first = session.generation();
    assert!(first > start);

    session.logout();
    assert!(!session.is_current(first));

    session.install(keypair(2));
    assert!(session.token().is_none());
    assert_eq!(session.public_key_hex(), Some(keypair(2).public_key_hex()));
}

#[tokio::test]
async fn test_refresh_result_dropped_after_logout() {
    let relay = MockRelay::new();
    let (session, _events) = session(&relay);
    session.install(keypair(1));
    relay.set_auth_delay(Duration::from_millis(100));

    let session = Arc::new(session);
    let refreshing = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh_token().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.logout();

    let err = refreshing.await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::SessionClosed(_)));
    assert!(session.token().is_none());
}
