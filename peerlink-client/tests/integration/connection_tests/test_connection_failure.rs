use std::sync::Arc;
use std::time::Duration;

use peerlink_client::connection::ConnectivityState;
use peerlink_client::engine::EngineEvent;
use peerlink_client::{ConnectionState, NoopConnectionListener};
use peerlink_core::{ConnectionConfig, ConnectionId, PeerId};

use crate::integration::init_tracing;
use crate::utils::{
    ConnectionEvent, RecordingConnectionListener, SIGNAL_TIMEOUT_MS, SessionEvent, answer_from,
    connected_session, eventually, offer_from,
};

#[tokio::test]
async fn test_connectivity_failure_removes_connection() {
    init_tracing();

    let (test, _link) = connected_session().await.expect("connect failed");
    let listener = RecordingConnectionListener::new();
    let bob = PeerId::from("bob");

    let handle = test
        .session
        .call("bob", ConnectionConfig::audio_video(), listener.clone())
        .await
        .expect("call failed");

    test.engine
        .emit(&bob, EngineEvent::ConnectivityChanged(ConnectivityState::Failed))
        .await;

    let state = tokio::time::timeout(
        Duration::from_millis(SIGNAL_TIMEOUT_MS),
        handle.wait_for(|s| s.is_terminal()),
    )
    .await
    .expect("connection did not fail");
    assert_eq!(state, ConnectionState::Error);

    assert!(
        test.listener
            .log
            .wait_for(|e| *e == SessionEvent::Hangup(bob.clone()), SIGNAL_TIMEOUT_MS)
            .await
    );
    assert_eq!(test.session.connection_state(&bob), None);
    assert!(test.session.active_peers().is_empty());
    assert_eq!(
        listener
            .log
            .count(|e| matches!(e, ConnectionEvent::Error(p, _) if *p == bob))
            .await,
        1
    );

    let log = test.engine.log_for(&bob).await.expect("no engine session");
    let log = log.lock().await;
    assert!(log.disposed);
    assert_eq!(log.released, 1, "local stream released once");
}

#[tokio::test]
async fn test_failed_negotiation_returns_errored_handle() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let listener = RecordingConnectionListener::new();
    let bob = PeerId::from("bob");

    test.engine.fail_remote_descriptions();
    link.send(offer_from("bob", "mc_remote01"));
    assert!(eventually(SIGNAL_TIMEOUT_MS, || test.session.has_offer(&bob)).await);

    let handle = test
        .session
        .answer("bob", ConnectionConfig::audio_video(), listener.clone())
        .await
        .expect("answer should hand back a handle");

    assert_eq!(handle.state(), ConnectionState::Error);
    assert_eq!(test.session.connection_state(&bob), None);
    assert!(!test.session.has_offer(&bob), "offer is consumed either way");
    assert!(
        listener
            .log
            .wait_for(|e| matches!(e, ConnectionEvent::Error(..)), SIGNAL_TIMEOUT_MS)
            .await
    );

    // The peer is free for a new call afterwards
    assert!(
        test.session
            .call("bob", ConnectionConfig::audio_only(), Arc::new(NoopConnectionListener))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_answer_for_other_connection_id_is_ignored() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    let handle = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");

    link.send(answer_from("bob", &ConnectionId::from("mc_someone_else")));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.state(), ConnectionState::OfferSent);
    assert_eq!(test.session.connection_state(&bob), Some(ConnectionState::OfferSent));
}

#[tokio::test]
async fn test_repeated_answer_does_not_break_open_connection() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");

    let handle = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");

    link.send(answer_from("bob", handle.connection_id()));
    tokio::time::timeout(
        Duration::from_millis(SIGNAL_TIMEOUT_MS),
        handle.wait_for(|s| s == ConnectionState::Open),
    )
    .await
    .expect("connection did not open");

    link.send(answer_from("bob", handle.connection_id()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.state(), ConnectionState::Open);
}
