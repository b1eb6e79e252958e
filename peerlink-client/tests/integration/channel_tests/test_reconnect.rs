use std::sync::Arc;

use peerlink_client::engine::EngineEvent;
use peerlink_client::{ChannelState, NoopConnectionListener};
use peerlink_core::{ConnectionConfig, IceCandidate, PeerId, SignalingMessage};

use crate::integration::init_tracing;
use crate::utils::{
    SIGNAL_TIMEOUT_MS, SessionEvent, TestSession, connected_session, eventually, next_link,
    test_config,
};

#[tokio::test]
async fn test_lost_link_is_reopened() {
    init_tracing();

    let (mut test, link) = connected_session().await.expect("connect failed");
    let first_url = link.url.clone();

    drop(link);

    let mut reopened = next_link(&mut test.links, SIGNAL_TIMEOUT_MS)
        .await
        .expect("client should reconnect");
    assert_eq!(reopened.url, first_url, "reconnect reuses identity and token");

    let session = &test.session;
    assert!(eventually(SIGNAL_TIMEOUT_MS, || session.is_connected()).await);
    assert_eq!(test.connector.connect_count(), 2);

    reopened.send(SignalingMessage::Ping);
    assert_eq!(
        reopened.recv(SIGNAL_TIMEOUT_MS).await,
        Some(SignalingMessage::Pong)
    );
}

#[tokio::test]
async fn test_reconnect_exhaustion_surfaces_once() {
    init_tracing();

    let (test, link) = connected_session().await.expect("connect failed");

    test.connector.refuse(true);
    drop(link);

    assert!(
        test.listener
            .log
            .wait_for(|e| *e == SessionEvent::Disconnected, 3000)
            .await,
        "exhaustion should end in on_disconnected"
    );
    assert_eq!(test.session.channel_state(), ChannelState::Disconnected);

    // One initial connect plus three refused attempts
    assert_eq!(test.connector.connect_count(), 4);
    let errors = test
        .listener
        .log
        .count(|e| matches!(e, SessionEvent::Error(msg) if msg.contains("gave up after 3")))
        .await;
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_messages_queued_while_reconnecting_are_flushed() {
    init_tracing();

    let mut config = test_config();
    config.reconnect.max_attempts = 20;
    let mut test = TestSession::new(config);
    let mut link = test.connect().await.expect("connect failed");

    let handle = test
        .session
        .call(
            "bob",
            ConnectionConfig::audio_video(),
            Arc::new(NoopConnectionListener),
        )
        .await
        .expect("call failed");
    assert!(link.recv_tagged(SignalingMessage::OFFER, SIGNAL_TIMEOUT_MS).await.is_some());

    test.connector.refuse(true);
    drop(link);

    let session = &test.session;
    assert!(
        eventually(SIGNAL_TIMEOUT_MS, || matches!(
            session.channel_state(),
            ChannelState::Reconnecting { .. }
        ))
        .await
    );

    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 1 192.168.1.2 40000 typ host".to_owned(),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
    };
    assert!(
        test.engine
            .emit(&PeerId::from("bob"), EngineEvent::LocalCandidate(candidate.clone()))
            .await
    );

    test.connector.refuse(false);
    let mut reopened = next_link(&mut test.links, SIGNAL_TIMEOUT_MS)
        .await
        .expect("client should reconnect");

    match reopened
        .recv_tagged(SignalingMessage::CANDIDATE, SIGNAL_TIMEOUT_MS)
        .await
    {
        Some(SignalingMessage::Candidate(c)) => {
            assert_eq!(c.connection_id, *handle.connection_id());
            assert_eq!(c.dst, Some(PeerId::from("bob")));
            assert_eq!(c.candidate, candidate);
        }
        other => panic!("expected the queued candidate, got {:?}", other),
    }
}
