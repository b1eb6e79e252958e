use std::sync::Arc;

use peerlink_client::engine::{EngineEvent, StreamHandle};
use peerlink_client::{ConnectionState, Direction, NoopConnectionListener};
use peerlink_core::{
    BitrateHints, ConnectionConfig, ConnectionId, ConnectionKind, PeerId, SdpType,
    SignalingMessage,
};

use crate::integration::init_tracing;
use crate::utils::{
    ConnectionEvent, RecordingConnectionListener, SIGNAL_TIMEOUT_MS, answer_from,
    connected_session, offer_from,
};

fn m_line(sdp: &str, prefix: &str) -> String {
    sdp.split("\r\n")
        .find(|l| l.starts_with(prefix))
        .expect("missing m-line")
        .to_owned()
}

#[tokio::test]
async fn test_call_sends_offer_and_opens_on_answer() {
    init_tracing();

    let (test, mut link) = connected_session().await.expect("connect failed");
    let listener = RecordingConnectionListener::new();
    let bob = PeerId::from("bob");

    let handle = test
        .session
        .call("bob", ConnectionConfig::audio_video(), listener.clone())
        .await
        .expect("call failed");

    assert_eq!(handle.state(), ConnectionState::OfferSent);
    assert_eq!(handle.direction(), Direction::Outbound);
    assert!(handle.connection_id().as_str().starts_with("mc_"));
    assert_eq!(test.session.connection_state(&bob), Some(ConnectionState::OfferSent));

    let offer = match link.recv_tagged(SignalingMessage::OFFER, SIGNAL_TIMEOUT_MS).await {
        Some(SignalingMessage::Offer(offer)) => offer,
        other => panic!("expected OFFER, got {:?}", other),
    };
    assert_eq!(offer.src.as_str(), "local-peer");
    assert_eq!(offer.dst, Some(bob.clone()));
    assert_eq!(offer.connection_id, *handle.connection_id());
    assert_eq!(offer.kind, ConnectionKind::Media);
    assert_eq!(offer.sdp.sdp_type, SdpType::Offer);

    link.send(answer_from("bob", handle.connection_id()));

    let state = tokio::time::timeout(
        std::time::Duration::from_millis(SIGNAL_TIMEOUT_MS),
        handle.wait_for(|s| s == ConnectionState::Open),
    )
    .await
    .expect("connection did not open");
    assert_eq!(state, ConnectionState::Open);
    assert!(
        listener
            .log
            .wait_for(|e| *e == ConnectionEvent::Open(bob.clone()), SIGNAL_TIMEOUT_MS)
            .await
    );

    let log = test.engine.log_for(&bob).await.expect("no engine session");
    let log = log.lock().await;
    assert_eq!(log.local.len(), 1);
    assert_eq!(log.remote.len(), 1);
    assert_eq!(log.remote[0].sdp_type, SdpType::Answer);
}

#[tokio::test]
async fn test_offer_prefers_default_codecs_and_bitrate() {
    init_tracing();

    let (test, mut link) = connected_session().await.expect("connect failed");

    let config = ConnectionConfig::audio_video().with_bitrate(BitrateHints {
        audio_kbps: None,
        video_kbps: Some(500),
    });
    test.session
        .call("bob", config, Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");

    let offer = match link.recv_tagged(SignalingMessage::OFFER, SIGNAL_TIMEOUT_MS).await {
        Some(SignalingMessage::Offer(offer)) => offer,
        other => panic!("expected OFFER, got {:?}", other),
    };

    assert_eq!(
        m_line(&offer.sdp.sdp, "m=audio"),
        "m=audio 9 UDP/TLS/RTP/SAVPF 111 103"
    );
    assert_eq!(
        m_line(&offer.sdp.sdp, "m=video"),
        "m=video 9 UDP/TLS/RTP/SAVPF 102 96"
    );
    assert!(offer.sdp.sdp.contains("b=AS:500"));

    // The engine got the rewritten description too
    let log = test
        .engine
        .log_for(&PeerId::from("bob"))
        .await
        .expect("no engine session");
    assert_eq!(log.lock().await.local[0].sdp, offer.sdp.sdp);
}

#[tokio::test]
async fn test_data_connection_sdp_is_untouched() {
    init_tracing();

    let (test, mut link) = connected_session().await.expect("connect failed");

    test.session
        .call("bob", ConnectionConfig::data_only(), Arc::new(NoopConnectionListener))
        .await
        .expect("call failed");

    let offer = match link.recv_tagged(SignalingMessage::OFFER, SIGNAL_TIMEOUT_MS).await {
        Some(SignalingMessage::Offer(offer)) => offer,
        other => panic!("expected OFFER, got {:?}", other),
    };
    assert_eq!(offer.kind, ConnectionKind::Data);
    assert_eq!(offer.sdp.sdp, crate::utils::MOCK_SDP);
}

#[tokio::test]
async fn test_answer_leaves_answer_sent_until_connectivity() {
    init_tracing();

    let (test, mut link) = connected_session().await.expect("connect failed");
    let listener = RecordingConnectionListener::new();
    let bob = PeerId::from("bob");

    link.send(offer_from("bob", "mc_remote01"));
    assert!(
        crate::utils::eventually(SIGNAL_TIMEOUT_MS, || test.session.has_offer(&bob)).await
    );

    let handle = test
        .session
        .answer("bob", ConnectionConfig::audio_video(), listener.clone())
        .await
        .expect("answer failed");
    assert_eq!(handle.state(), ConnectionState::AnswerSent);
    assert_eq!(handle.direction(), Direction::Inbound);
    assert_eq!(handle.connection_id(), &ConnectionId::from("mc_remote01"));

    match link.recv_tagged(SignalingMessage::ANSWER, SIGNAL_TIMEOUT_MS).await {
        Some(SignalingMessage::Answer(answer)) => {
            assert_eq!(answer.connection_id, ConnectionId::from("mc_remote01"));
            assert_eq!(answer.dst, Some(bob.clone()));
            assert_eq!(answer.sdp.sdp_type, SdpType::Answer);
        }
        other => panic!("expected ANSWER, got {:?}", other),
    }

    let stream = StreamHandle {
        id: "remote-stream".to_owned(),
        local: false,
    };
    test.engine
        .emit(&bob, EngineEvent::StreamAdded(stream.clone()))
        .await;
    test.engine
        .emit(
            &bob,
            EngineEvent::ConnectivityChanged(peerlink_client::connection::ConnectivityState::Connected),
        )
        .await;

    let state = tokio::time::timeout(
        std::time::Duration::from_millis(SIGNAL_TIMEOUT_MS),
        handle.wait_for(|s| s == ConnectionState::Open),
    )
    .await
    .expect("connection did not open");
    assert_eq!(state, ConnectionState::Open);
    assert!(
        listener
            .log
            .contains(&ConnectionEvent::StreamAdded(bob.clone(), stream.id.clone()))
            .await
    );
}

fn data_offer_from(src: &str, connection_id: &str) -> SignalingMessage {
    let SignalingMessage::Offer(mut offer) = offer_from(src, connection_id) else {
        unreachable!("offer_from builds an OFFER");
    };
    offer.kind = ConnectionKind::Data;
    SignalingMessage::Offer(offer)
}

#[tokio::test]
async fn test_answer_keeps_the_offered_data_kind() {
    init_tracing();

    let (test, mut link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    link.send(data_offer_from("bob", "mc_data0001"));
    assert!(
        crate::utils::eventually(SIGNAL_TIMEOUT_MS, || test.session.has_offer(&bob)).await
    );

    // Local media is attached, the connection is still a data one
    test.session
        .answer("bob", ConnectionConfig::audio_video(), Arc::new(NoopConnectionListener))
        .await
        .expect("answer failed");

    match link.recv_tagged(SignalingMessage::ANSWER, SIGNAL_TIMEOUT_MS).await {
        Some(SignalingMessage::Answer(answer)) => {
            assert_eq!(answer.kind, Some(ConnectionKind::Data));
            assert_eq!(answer.sdp.sdp, crate::utils::MOCK_SDP);
        }
        other => panic!("expected ANSWER, got {:?}", other),
    }

    let log = test.engine.log_for(&bob).await.expect("no engine session");
    let log = log.lock().await;
    assert_eq!(log.remote[0].sdp, crate::utils::MOCK_SDP);
    assert_eq!(log.local[0].sdp, crate::utils::MOCK_SDP);
}

#[tokio::test]
async fn test_receive_only_answer_to_media_offer_is_media() {
    init_tracing();

    let (test, mut link) = connected_session().await.expect("connect failed");
    let bob = PeerId::from("bob");

    link.send(offer_from("bob", "mc_media001"));
    assert!(
        crate::utils::eventually(SIGNAL_TIMEOUT_MS, || test.session.has_offer(&bob)).await
    );

    test.session
        .answer("bob", ConnectionConfig::data_only(), Arc::new(NoopConnectionListener))
        .await
        .expect("answer failed");

    match link.recv_tagged(SignalingMessage::ANSWER, SIGNAL_TIMEOUT_MS).await {
        Some(SignalingMessage::Answer(answer)) => {
            assert_eq!(answer.kind, Some(ConnectionKind::Media));
            assert_eq!(
                m_line(&answer.sdp.sdp, "m=audio"),
                "m=audio 9 UDP/TLS/RTP/SAVPF 111 103"
            );
        }
        other => panic!("expected ANSWER, got {:?}", other),
    }
}
