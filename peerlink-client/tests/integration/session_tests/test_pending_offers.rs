use std::sync::Arc;
use std::time::Duration;

use peerlink_client::{AnswerError, ConnectionState, NoopConnectionListener};
use peerlink_core::{ConnectionConfig, ConnectionId, PeerId};

use crate::integration::init_tracing;
use crate::utils::{
    SIGNAL_TIMEOUT_MS, SessionEvent, TestSession, connected_session, eventually, offer_from,
    test_config,
};

#[tokio::test]
async fn test_incoming_offer_is_recorded_and_announced() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    link.send(offer_from("bob", "mc_first"));

    assert!(
        test.listener
            .log
            .wait_for(|e| *e == SessionEvent::Incoming(bob.clone()), SIGNAL_TIMEOUT_MS)
            .await
    );
    assert!(test.session.has_offer(&bob));
    assert_eq!(test.session.context().pending_offers(), vec![bob.clone()]);
    assert_eq!(test.session.connection_state(&bob), None);
}

#[tokio::test]
async fn test_newer_offer_replaces_older_one() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    link.send(offer_from("bob", "mc_first"));
    link.send(offer_from("bob", "mc_second"));

    let start = std::time::Instant::now();
    while test
        .listener
        .log
        .count(|e| *e == SessionEvent::Incoming(bob.clone()))
        .await
        < 2
    {
        assert!(
            start.elapsed() < Duration::from_millis(SIGNAL_TIMEOUT_MS),
            "both offers should be announced"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let handle = test
        .session
        .answer("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("answer failed");
    assert_eq!(handle.connection_id(), &ConnectionId::from("mc_second"));
}

#[tokio::test]
async fn test_answer_consumes_pending_offer() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    link.send(offer_from("bob", "mc_first"));
    assert!(eventually(SIGNAL_TIMEOUT_MS, || test.session.has_offer(&bob)).await);

    let handle = test
        .session
        .answer("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("answer failed");

    assert!(!test.session.has_offer(&bob));
    assert_eq!(handle.state(), ConnectionState::AnswerSent);
    assert_eq!(
        test.session.connection_state(&bob),
        Some(ConnectionState::AnswerSent)
    );
    assert_eq!(test.session.active_peers(), vec![bob.clone()]);

    // Second answer has nothing left to consume, but the peer is connected now
    let again = test
        .session
        .answer("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await;
    assert_eq!(again.err(), Some(AnswerError::AlreadyConnected(bob)));
}

#[tokio::test]
async fn test_answer_without_offer_fails() {
    init_tracing();

    let (test, _link) = connected_session().await.expect("connect failed");

    let result = test
        .session
        .answer("nobody", ConnectionConfig::audio_only(), Arc::new(NoopConnectionListener))
        .await;

    assert_eq!(
        result.err(),
        Some(AnswerError::NoPendingOffer(PeerId::from("nobody")))
    );
    assert_eq!(test.engine.session_count().await, 0);
}

#[tokio::test]
async fn test_operations_before_connect_need_open_channel() {
    init_tracing();

    let test = TestSession::new(test_config());

    let call = test
        .session
        .call("bob", ConnectionConfig::audio_only(), Arc::new(NoopConnectionListener))
        .await;
    assert_eq!(call.err(), Some(peerlink_client::CallError::ChannelNotOpen));

    let answer = test
        .session
        .answer("bob", ConnectionConfig::audio_only(), Arc::new(NoopConnectionListener))
        .await;
    assert_eq!(answer.err(), Some(AnswerError::ChannelNotOpen));
}

#[tokio::test]
async fn test_peer_close_drops_pending_offer() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    link.send(offer_from("bob", "mc_first"));
    assert!(eventually(SIGNAL_TIMEOUT_MS, || test.session.has_offer(&bob)).await);

    link.send(peerlink_core::SignalingMessage::Close {
        src: Some(bob.clone()),
    });
    assert!(eventually(SIGNAL_TIMEOUT_MS, || !test.session.has_offer(&bob)).await);
    assert!(test.session.is_connected());
}
