use crate::engine::StreamHandle;
use crate::error::NegotiationError;
use async_trait::async_trait;
use peerlink_core::PeerId;

/// Уведомления об одном соединении. Все методы по умолчанию ничего не делают.
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    async fn on_open(&self, _peer_id: &PeerId) {}

    async fn on_stream_added(&self, _peer_id: &PeerId, _stream: &StreamHandle) {}

    async fn on_stream_removed(&self, _peer_id: &PeerId, _stream: &StreamHandle) {}

    async fn on_close(&self, _peer_id: &PeerId) {}

    async fn on_error(&self, _peer_id: &PeerId, _error: &NegotiationError) {}
}

/// Listener for callers that only watch the handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnectionListener;

impl ConnectionListener for NoopConnectionListener {}
