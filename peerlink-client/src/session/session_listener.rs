use crate::error::SessionError;
use crate::session::context::SessionContext;
use async_trait::async_trait;
use peerlink_core::PeerId;

/// Уведомления уровня сессии. Все методы по умолчанию ничего не делают.
#[async_trait]
pub trait SessionListener: Send + Sync + 'static {
    /// Канал открыт, `peer_id` - наш идентификатор.
    async fn on_connected(&self, _ctx: &SessionContext, _peer_id: &PeerId) {}

    /// Пришёл OFFER; ответить можно через `PeerSession::answer`.
    async fn on_incoming(&self, _ctx: &SessionContext, _peer_id: &PeerId) {}

    /// Соединение с пиром закрылось не по нашему `hangup`.
    async fn on_hangup(&self, _ctx: &SessionContext, _peer_id: &PeerId) {}

    /// Сигнальный канал закрыт окончательно.
    async fn on_disconnected(&self, _ctx: &SessionContext) {}

    async fn on_error(&self, _ctx: &SessionContext, _error: &SessionError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionListener;

impl SessionListener for NoopSessionListener {}
