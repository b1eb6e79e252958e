use crate::connection::ConnectionState;
use peerlink_core::PeerId;
use thiserror::Error;

/// Ошибки запуска сигнального канала. Никогда не повторяются автоматически.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("rendezvous service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("signaling channel rejected: {0}")]
    ChannelRejected(String),

    #[error("timed out waiting for the signaling service")]
    Timeout,

    #[error("reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("signaling channel already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("signaling channel is not open")]
    ChannelNotOpen,

    #[error("already connected to {0}")]
    AlreadyConnected(PeerId),

    #[error("session destroyed")]
    SessionClosed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnswerError {
    #[error("no pending offer from {0}")]
    NoPendingOffer(PeerId),

    #[error("signaling channel is not open")]
    ChannelNotOpen,

    #[error("already connected to {0}")]
    AlreadyConnected(PeerId),

    #[error("session destroyed")]
    SessionClosed,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("webrtc: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("engine session disposed")]
    Disposed,

    #[error("{0}")]
    Other(String),
}

/// Ошибки согласования, завершают только затронутое соединение.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("media engine: {0}")]
    Engine(#[from] EngineError),

    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("connectivity {0}")]
    Connectivity(&'static str),
}

#[derive(Debug, Error)]
pub enum RendezvousError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("empty identity")]
    EmptyIdentity,

    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("connection refused: {0}")]
    Refused(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

/// Ошибки уровня сессии, которые получает `SessionListener::on_error`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("signaling channel closed by server: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),

    #[error("connection to {peer_id} failed: {source}")]
    Connection {
        peer_id: PeerId,
        #[source]
        source: NegotiationError,
    },

    #[error("session destroyed")]
    Closed,
}
