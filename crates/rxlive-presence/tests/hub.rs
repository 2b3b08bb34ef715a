//! Integration tests for shared, reference-counted presence channels.

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rxlive_presence::PresenceHub;
use rxlive_protocol::OutletId;
use rxlive_session::{now_unix, CredentialStore, MemoryStore, UserProfile};
use rxlive_transport::{MemoryConnector, MemoryListener, MemoryPeer};

fn signed_in() -> CredentialStore {
    let claims = format!(r#"{{"sub":"u-1","exp":{}}}"#, now_unix() + 3600);
    let token = format!("eyJhbGciOiJub25lIn0.{}.sig", URL_SAFE_NO_PAD.encode(claims));
    let profile: UserProfile = serde_json::from_str(r#"{"id":"u-1","outletId":"outlet-1"}"#).expect("profile");

    let store = CredentialStore::load(MemoryStore::new());
    store.login(&token, &profile).expect("login");
    store
}

async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(600), fut)
        .await
        .expect("timed out")
}

async fn accept(listener: &mut MemoryListener) -> MemoryPeer {
    within(listener.accept()).await.expect("connector dropped")
}

#[tokio::test(start_paused = true)]
async fn test_leases_on_one_outlet_share_a_connection() {
    let store = signed_in();
    let (connector, mut listener) = MemoryConnector::new();
    let probe = connector.clone();
    let hub = PresenceHub::new(connector, store.watch());
    let outlet = OutletId::new("outlet-1");

    let mut badge = hub.lease(outlet.clone());
    let sidebar = hub.lease(outlet.clone());
    assert_eq!(hub.lease_count(&outlet), 2);

    let peer = accept(&mut listener).await;
    peer.send(r#"{"type":"roster","entries":[{"userId":"C","role":"staff"}]}"#);

    let seen_by_badge = within(async {
        loop {
            let s = badge.changed().await;
            if !s.online_users.is_empty() {
                break s;
            }
        }
    })
    .await;
    let mut rx = sidebar.subscribe();
    let seen_by_sidebar = within(rx.wait_for(|s| !s.online_users.is_empty()))
        .await
        .expect("channel open")
        .clone();
    assert_eq!(seen_by_badge.online_users, seen_by_sidebar.online_users);
    assert_eq!(sidebar.snapshot().online_users.len(), 1);

    assert_eq!(probe.attempts(), 1);
    assert!(listener.try_accept().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_channel_closes_with_last_lease() {
    let store = signed_in();
    let (connector, mut listener) = MemoryConnector::new();
    let probe = connector.clone();
    let hub = PresenceHub::new(connector, store.watch());
    let outlet = OutletId::new("outlet-1");

    let first = hub.lease(outlet.clone());
    let second = hub.lease(outlet.clone());
    let peer = accept(&mut listener).await;

    drop(first);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!peer.is_closed(), "closed while a lease is still held");
    assert_eq!(hub.lease_count(&outlet), 1);

    drop(second);
    within(peer.closed()).await;
    assert!(hub.outlets().is_empty());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(probe.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_outlets_get_separate_channels() {
    let store = signed_in();
    let (connector, mut listener) = MemoryConnector::new();
    let hub = PresenceHub::new(connector, store.watch());

    let _b = hub.lease(OutletId::new("outlet-b"));
    let _a = hub.lease(OutletId::new("outlet-a"));

    let mut scopes = vec![
        accept(&mut listener).await.outlet().to_string(),
        accept(&mut listener).await.outlet().to_string(),
    ];
    scopes.sort();
    assert_eq!(scopes, ["outlet-a", "outlet-b"]);
    assert_eq!(
        hub.outlets(),
        vec![OutletId::new("outlet-a"), OutletId::new("outlet-b")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_lease_after_release_opens_fresh_channel() {
    let store = signed_in();
    let (connector, mut listener) = MemoryConnector::new();
    let hub = PresenceHub::new(connector, store.watch());
    let outlet = OutletId::new("outlet-1");

    let lease = hub.lease(outlet.clone());
    let first = accept(&mut listener).await;
    drop(lease);
    within(first.closed()).await;

    let lease = hub.lease(outlet.clone());
    let second = accept(&mut listener).await;
    assert_ne!(first.id(), second.id());
    assert_eq!(lease.outlet(), &outlet);
}
