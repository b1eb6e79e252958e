pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod session;
pub mod signaling;

pub use config::{ServerConfig, SessionConfig};
pub use connection::{
    ConnectionHandle, ConnectionListener, ConnectionState, Direction, NoopConnectionListener,
};
pub use engine::{EngineConfig, MediaEngine, WebRtcEngine};
pub use error::{AnswerError, CallError, ConnectError, SessionError};
pub use session::{NoopSessionListener, PeerSession, SessionContext, SessionListener};
pub use signaling::{ChannelState, ReconnectPolicy};
