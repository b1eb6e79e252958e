use crate::connection::ConnectionState;
use dashmap::DashMap;
use peerlink_core::{ConnectionId, PeerId};
use std::sync::Arc;
use tokio::sync::watch;

/// Снимок таблиц сессии только для чтения.
/// Пишет в него только цикл сессии; клонировать и передавать между потоками безопасно.
#[derive(Clone, Default)]
pub struct SessionContext {
    connections: Arc<DashMap<PeerId, watch::Receiver<ConnectionState>>>,
    offers: Arc<DashMap<PeerId, ConnectionId>>,
}

impl SessionContext {
    pub fn connection_state(&self, peer_id: &PeerId) -> Option<ConnectionState> {
        self.connections.get(peer_id).map(|rx| *rx.borrow())
    }

    /// Peers with a connection that has not closed or failed.
    pub fn active_peers(&self) -> Vec<PeerId> {
        self.connections
            .iter()
            .filter(|entry| !entry.value().borrow().is_terminal())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn has_connection(&self, peer_id: &PeerId) -> bool {
        self.connections.contains_key(peer_id)
    }

    pub fn has_offer(&self, peer_id: &PeerId) -> bool {
        self.offers.contains_key(peer_id)
    }

    pub fn pending_offers(&self) -> Vec<PeerId> {
        self.offers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub(crate) fn track_connection(
        &self,
        peer_id: PeerId,
        state: watch::Receiver<ConnectionState>,
    ) {
        self.connections.insert(peer_id, state);
    }

    pub(crate) fn forget_connection(&self, peer_id: &PeerId) {
        self.connections.remove(peer_id);
    }

    pub(crate) fn track_offer(&self, peer_id: PeerId, connection_id: ConnectionId) {
        self.offers.insert(peer_id, connection_id);
    }

    pub(crate) fn forget_offer(&self, peer_id: &PeerId) {
        self.offers.remove(peer_id);
    }

    pub(crate) fn clear(&self) {
        self.connections.clear();
        self.offers.clear();
    }
}
