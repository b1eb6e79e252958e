use std::sync::Arc;
use std::time::Duration;

use peerlink_client::{CallError, ConnectionState, NoopConnectionListener};
use peerlink_core::{ConnectionConfig, PeerId, SignalingMessage};

use crate::integration::init_tracing;
use crate::utils::{
    ConnectionEvent, RecordingConnectionListener, SIGNAL_TIMEOUT_MS, SessionEvent,
    connected_session,
};

#[tokio::test]
async fn test_call_twice_then_hangup_then_call() {
    init_tracing();

    let (test, _link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    let first = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");

    let second = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await;
    assert_eq!(second.err(), Some(CallError::AlreadyConnected(bob.clone())));
    assert_eq!(test.engine.session_count().await, 1, "no second engine session");

    assert!(test.session.hangup("bob").await);
    assert_eq!(first.state(), ConnectionState::Closed);
    assert_eq!(test.session.connection_state(&bob), None);
    assert!(!test.session.hangup("bob").await, "nothing left to hang up");

    let third = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("call after hangup failed");
    assert_ne!(third.connection_id(), first.connection_id());
    assert_eq!(
        test.session.connection_state(&bob),
        Some(ConnectionState::OfferSent)
    );
}

#[tokio::test]
async fn test_handle_hangup_closes_only_its_connection() {
    init_tracing();

    let (test, _link) = connected_session().await.expect("connect failed");
    let listener = RecordingConnectionListener::new();
    let bob = PeerId::from("bob");

    let old = test
        .session
        .call("bob", ConnectionConfig::audio_video(), listener.clone())
        .await
        .expect("call failed");
    assert!(old.hangup().await);
    assert!(
        listener
            .log
            .contains(&ConnectionEvent::Close(bob.clone()))
            .await
    );

    let current = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");

    // A stale handle must not close the newer connection
    assert!(!old.hangup().await);
    assert_eq!(current.state(), ConnectionState::OfferSent);
    assert!(current.hangup().await);
}

#[tokio::test]
async fn test_remote_leave_tears_down_peer() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    let handle = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");

    link.send(SignalingMessage::Leave {
        src: Some(bob.clone()),
    });

    assert!(
        test.listener
            .log
            .wait_for(|e| *e == SessionEvent::Hangup(bob.clone()), SIGNAL_TIMEOUT_MS)
            .await
    );
    assert_eq!(handle.state(), ConnectionState::Closed);
    assert!(test.session.active_peers().is_empty());

    let log = test.engine.log_for(&bob).await.expect("no engine session");
    assert!(log.lock().await.disposed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(test.session.is_connected(), "peer leave keeps the channel");
}
