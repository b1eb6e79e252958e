use async_trait::async_trait;
use peerlink_core::{ConnectionId, ConnectionKind, IceCandidate, PeerId, SessionDescription};

/// Трейт, через который соединение отправляет SDP и ICE удалённому пиру.
/// Реализуется сигнальным каналом; в тестах подменяется моком.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Отправить SDP Offer конкретному пиру.
    async fn send_offer(
        &self,
        peer_id: PeerId,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        sdp: SessionDescription,
    );

    /// Отправить SDP Answer конкретному пиру.
    async fn send_answer(
        &self,
        peer_id: PeerId,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        sdp: SessionDescription,
    );

    /// Отправить локального ICE кандидата (trickle ICE).
    async fn send_candidate(
        &self,
        peer_id: PeerId,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        candidate: IceCandidate,
    );
}
