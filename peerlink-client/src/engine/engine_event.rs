use crate::connection::ConnectivityState;
use peerlink_core::{ConnectionId, IceCandidate, PeerId};
use tokio::sync::mpsc;
use tracing::debug;

/// Поток медиа, принадлежит движку; наружу выдаётся только описатель.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub id: String,
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    LocalCandidate(IceCandidate),
    ConnectivityChanged(ConnectivityState),
    StreamAdded(StreamHandle),
    StreamRemoved(StreamHandle),
}

/// Событие движка с адресом соединения, которому оно принадлежит.
#[derive(Debug)]
pub struct EngineNotice {
    pub peer_id: PeerId,
    pub connection_id: ConnectionId,
    pub event: EngineEvent,
}

/// Куда движок отправляет события одной сессии.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    peer_id: PeerId,
    connection_id: ConnectionId,
    tx: mpsc::Sender<EngineNotice>,
}

impl EngineEventSink {
    pub fn new(peer_id: PeerId, connection_id: ConnectionId, tx: mpsc::Sender<EngineNotice>) -> Self {
        Self {
            peer_id,
            connection_id,
            tx,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub async fn emit(&self, event: EngineEvent) {
        let notice = EngineNotice {
            peer_id: self.peer_id.clone(),
            connection_id: self.connection_id.clone(),
            event,
        };
        if self.tx.send(notice).await.is_err() {
            debug!("Engine event for {} dropped, session loop gone", self.peer_id);
        }
    }
}
