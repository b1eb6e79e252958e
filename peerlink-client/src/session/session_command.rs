use crate::connection::{ConnectionHandle, ConnectionListener};
use crate::error::{AnswerError, CallError};
use peerlink_core::{ConnectionConfig, ConnectionId, PeerId, PeerEntry};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Команды, поступающие в цикл сессии от фасада и описателей соединений.
pub enum SessionCommand {
    /// Позвонить пиру: создать соединение и отправить OFFER.
    Call {
        peer_id: PeerId,
        config: ConnectionConfig,
        listener: Arc<dyn ConnectionListener>,
        reply: oneshot::Sender<Result<ConnectionHandle, CallError>>,
    },

    /// Ответить на ожидающий OFFER.
    Answer {
        peer_id: PeerId,
        config: ConnectionConfig,
        listener: Arc<dyn ConnectionListener>,
        reply: oneshot::Sender<Result<ConnectionHandle, AnswerError>>,
    },

    /// Закрыть соединение. С `connection_id` закрывается только это соединение.
    Hangup {
        peer_id: PeerId,
        connection_id: Option<ConnectionId>,
        reply: oneshot::Sender<bool>,
    },

    /// Разметить список пиров из discovery по локальным таблицам.
    Classify {
        peers: Vec<PeerId>,
        reply: oneshot::Sender<Vec<PeerEntry>>,
    },

    /// Закрыть всё и завершить цикл.
    Destroy { reply: oneshot::Sender<()> },
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { peer_id, .. } => write!(f, "Call({peer_id})"),
            Self::Answer { peer_id, .. } => write!(f, "Answer({peer_id})"),
            Self::Hangup { peer_id, .. } => write!(f, "Hangup({peer_id})"),
            Self::Classify { peers, .. } => write!(f, "Classify({} peers)", peers.len()),
            Self::Destroy { .. } => write!(f, "Destroy"),
        }
    }
}
