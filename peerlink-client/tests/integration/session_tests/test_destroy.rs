use std::sync::Arc;

use peerlink_client::{CallError, ChannelState, ConnectError, ConnectionState, NoopConnectionListener};
use peerlink_core::{ConnectionConfig, PeerId, SignalingMessage};

use crate::integration::init_tracing;
use crate::utils::{
    SIGNAL_TIMEOUT_MS, TestSession, connected_session, eventually, next_link, offer_from,
    test_config,
};

#[tokio::test]
async fn test_destroy_closes_everything() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");
    let carol = PeerId::from("carol");

    let handle = test
        .session
        .call("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");
    link.send(offer_from("carol", "mc_carol"));
    assert!(eventually(SIGNAL_TIMEOUT_MS, || test.session.has_offer(&carol)).await);

    test.session.destroy().await;

    assert_eq!(handle.state(), ConnectionState::Closed);
    assert!(test.session.active_peers().is_empty());
    assert!(!test.session.has_offer(&carol));
    assert_eq!(test.session.connection_state(&bob), None);
    assert_eq!(test.session.channel_state(), ChannelState::Disconnected);

    let log = test.engine.log_for(&bob).await.expect("no engine session");
    assert!(log.lock().await.disposed);
}

#[tokio::test]
async fn test_destroy_is_idempotent_and_final() {
    init_tracing();

    let (test, _link) = connected_session().await.expect("connect failed");

    test.session.destroy().await;
    test.session.destroy().await;

    assert_eq!(
        test.session.connect().await,
        Err(ConnectError::ChannelRejected("session destroyed".to_owned()))
    );
    let call = test
        .session
        .call("bob", ConnectionConfig::audio_only(), Arc::new(NoopConnectionListener))
        .await;
    assert_eq!(call.err(), Some(CallError::SessionClosed));
    assert!(!test.session.hangup("bob").await);
    assert!(test.session.list_peers().await.is_err());
}

#[tokio::test]
async fn test_destroy_during_handshake_keeps_channel_closed() {
    init_tracing();

    let mut test = TestSession::manual(test_config());
    let TestSession {
        session, links, ..
    } = &mut test;

    // Destroy lands while the channel waits for OPEN, then OPEN arrives
    let (result, mut link) = tokio::join!(session.connect(), async {
        let link = next_link(links, SIGNAL_TIMEOUT_MS).await.expect("no link");
        session.destroy().await;
        link.open();
        link
    });

    assert!(matches!(result, Err(ConnectError::ChannelRejected(_))));
    assert_eq!(session.channel_state(), ChannelState::Disconnected);
    assert!(!session.is_connected());

    // No driver is left behind to answer the server
    link.send(SignalingMessage::Ping);
    assert_eq!(link.recv(300).await, None);
}
