use crate::connection::Direction;
use crate::engine::engine_event::{EngineEventSink, StreamHandle};
use crate::error::EngineError;
use async_trait::async_trait;
use peerlink_core::{
    ConnectionConfig, ConnectionId, IceCandidate, PeerId, SdpType, SessionDescription,
};

/// Что нужно движку, чтобы создать сессию под одно соединение.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub peer_id: PeerId,
    pub connection_id: ConnectionId,
    pub direction: Direction,
    pub config: ConnectionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaConstraints {
    pub receive_audio: bool,
    pub receive_video: bool,
}

impl MediaConstraints {
    pub fn for_config(config: &ConnectionConfig) -> Self {
        let media = config.media();
        Self {
            receive_audio: media.audio,
            receive_video: media.video,
        }
    }
}

/// Внешний медиа движок. Сессия не трогает медиа байты, только описания.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_session(
        &self,
        spec: &SessionSpec,
        sink: EngineEventSink,
    ) -> Result<Box<dyn MediaSession>, EngineError>;
}

#[async_trait]
pub trait MediaSession: Send + Sync {
    async fn create_local_description(
        &self,
        sdp_type: SdpType,
        constraints: &MediaConstraints,
    ) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), EngineError>;

    async fn set_remote_description(&self, desc: &SessionDescription)
    -> Result<(), EngineError>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), EngineError>;

    /// `None` when the config asks for no local media.
    async fn attach_local_stream(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Option<StreamHandle>, EngineError>;

    async fn release_stream(&self, stream: &StreamHandle);

    async fn dispose(&self);
}
