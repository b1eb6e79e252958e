use crate::connection::connection_listener::ConnectionListener;
use crate::connection::connection_state::{ConnectionState, ConnectivityState, Direction};
use crate::engine::{
    EngineEvent, EngineEventSink, MediaConstraints, MediaEngine, MediaSession, SessionSpec,
    StreamHandle,
};
use crate::error::NegotiationError;
use crate::signaling::SignalingOutput;
use peerlink_core::sdp::{MediaSection, limit_bandwidth, negotiate};
use peerlink_core::{
    AnswerMessage, CandidateMessage, ConnectionConfig, ConnectionId, ConnectionKind,
    OfferMessage, PeerId, SdpType, SessionDescription,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Одно соединение с одним удалённым пиром и его машина состояний.
///
/// Принадлежит таблице соединений сессии; снаружи доступно только
/// через `ConnectionHandle`.
pub struct MediaConnection {
    peer_id: PeerId,
    connection_id: ConnectionId,
    direction: Direction,
    kind: ConnectionKind,
    config: ConnectionConfig,
    signaling: Arc<dyn SignalingOutput>,
    listener: Arc<dyn ConnectionListener>,
    session: Option<Box<dyn MediaSession>>,
    state: watch::Sender<ConnectionState>,
    connectivity: ConnectivityState,
    local_stream: Option<StreamHandle>,
    remote_streams: Vec<StreamHandle>,
    released: bool,
}

impl MediaConnection {
    pub fn outbound(
        peer_id: PeerId,
        config: ConnectionConfig,
        signaling: Arc<dyn SignalingOutput>,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        let kind = config.kind();
        Self::new(
            peer_id,
            ConnectionId::generate(),
            Direction::Outbound,
            kind,
            config,
            signaling,
            listener,
        )
    }

    /// Inbound connections reuse the offer's id so the answer routes back.
    /// The kind comes from the offer, not from what we attach locally.
    pub fn inbound(
        offer: &OfferMessage,
        config: ConnectionConfig,
        signaling: Arc<dyn SignalingOutput>,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        Self::new(
            offer.src.clone(),
            offer.connection_id.clone(),
            Direction::Inbound,
            offer.kind,
            config,
            signaling,
            listener,
        )
    }

    fn new(
        peer_id: PeerId,
        connection_id: ConnectionId,
        direction: Direction,
        kind: ConnectionKind,
        config: ConnectionConfig,
        signaling: Arc<dyn SignalingOutput>,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            peer_id,
            connection_id,
            direction,
            kind,
            config,
            signaling,
            listener,
            session: None,
            state,
            connectivity: ConnectivityState::New,
            local_stream: None,
            remote_streams: Vec::new(),
            released: false,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("Connection {} to {}: {:?} -> {:?}", self.connection_id, self.peer_id, prev, next);
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: ConnectionState,
    ) -> Result<(), NegotiationError> {
        let state = self.state();
        if state != expected {
            return Err(NegotiationError::InvalidState { operation, state });
        }
        Ok(())
    }

    fn session(&self) -> Result<&dyn MediaSession, NegotiationError> {
        self.session
            .as_deref()
            .ok_or(NegotiationError::Engine(crate::error::EngineError::Disposed))
    }

    /// Codec preference applies to media connections only.
    fn transform_inbound(&self, desc: &SessionDescription) -> SessionDescription {
        if self.kind() != ConnectionKind::Media {
            return desc.clone();
        }
        desc.with_sdp(negotiate(&desc.sdp, self.config.codecs()))
    }

    fn transform_outbound(&self, desc: &SessionDescription) -> SessionDescription {
        if self.kind() != ConnectionKind::Media {
            return desc.clone();
        }

        let mut sdp = negotiate(&desc.sdp, self.config.codecs());
        let bitrate = self.config.bitrate();
        if let Some(kbps) = bitrate.audio_kbps {
            sdp = limit_bandwidth(&sdp, MediaSection::Audio, kbps);
        }
        if let Some(kbps) = bitrate.video_kbps {
            sdp = limit_bandwidth(&sdp, MediaSection::Video, kbps);
        }
        desc.with_sdp(sdp)
    }

    async fn open_session(
        &mut self,
        engine: &dyn MediaEngine,
        sink: EngineEventSink,
    ) -> Result<(), NegotiationError> {
        let spec = SessionSpec {
            peer_id: self.peer_id.clone(),
            connection_id: self.connection_id.clone(),
            direction: self.direction,
            config: self.config.clone(),
        };
        let session = engine.create_session(&spec, sink).await?;
        self.local_stream = session.attach_local_stream(&self.config).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Outbound negotiation: local offer, codec transform, OFFER, `OfferSent`.
    pub async fn create_offer(
        &mut self,
        engine: &dyn MediaEngine,
        sink: EngineEventSink,
    ) -> Result<(), NegotiationError> {
        match self.try_create_offer(engine, sink).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn try_create_offer(
        &mut self,
        engine: &dyn MediaEngine,
        sink: EngineEventSink,
    ) -> Result<(), NegotiationError> {
        self.expect_state("create an offer", ConnectionState::Idle)?;
        self.open_session(engine, sink).await?;

        let constraints = MediaConstraints::for_config(&self.config);
        let session = self.session()?;
        let local = session
            .create_local_description(SdpType::Offer, &constraints)
            .await?;
        let local = self.transform_outbound(&local);
        session.set_local_description(&local).await?;

        self.signaling
            .send_offer(
                self.peer_id.clone(),
                self.connection_id.clone(),
                self.kind(),
                local,
            )
            .await;
        self.set_state(ConnectionState::OfferSent);
        info!("Offer sent to {} ({})", self.peer_id, self.connection_id);
        Ok(())
    }

    /// Inbound negotiation: remote offer, `OfferReceived`, local answer, ANSWER, `AnswerSent`.
    pub async fn create_answer(
        &mut self,
        engine: &dyn MediaEngine,
        sink: EngineEventSink,
        offer: &OfferMessage,
    ) -> Result<(), NegotiationError> {
        match self.try_create_answer(engine, sink, offer).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn try_create_answer(
        &mut self,
        engine: &dyn MediaEngine,
        sink: EngineEventSink,
        offer: &OfferMessage,
    ) -> Result<(), NegotiationError> {
        self.expect_state("answer an offer", ConnectionState::Idle)?;
        self.open_session(engine, sink).await?;

        let remote = self.transform_inbound(&offer.sdp);
        self.session()?.set_remote_description(&remote).await?;
        self.set_state(ConnectionState::OfferReceived);

        let constraints = MediaConstraints::for_config(&self.config);
        let session = self.session()?;
        let local = session
            .create_local_description(SdpType::Answer, &constraints)
            .await?;
        let local = self.transform_outbound(&local);
        session.set_local_description(&local).await?;

        self.signaling
            .send_answer(
                self.peer_id.clone(),
                self.connection_id.clone(),
                self.kind(),
                local,
            )
            .await;
        self.set_state(ConnectionState::AnswerSent);
        info!("Answer sent to {} ({})", self.peer_id, self.connection_id);
        Ok(())
    }

    /// Remote answer to our offer. Only valid in `OfferSent`; anything else
    /// is reported and ignored without touching the connection.
    pub async fn handle_answer(&mut self, answer: &AnswerMessage) -> Result<(), NegotiationError> {
        self.expect_state("apply an answer", ConnectionState::OfferSent)?;

        let remote = self.transform_inbound(&answer.sdp);
        let applied = match self.session() {
            Ok(session) => session.set_remote_description(&remote).await.map_err(Into::into),
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            self.fail(&e).await;
            return Err(e);
        }

        self.set_state(ConnectionState::AnswerReceived);
        self.set_open().await;
        Ok(())
    }

    pub async fn handle_candidate(&mut self, message: &CandidateMessage) {
        if self.is_terminal() || self.connectivity.is_settled() {
            debug!(
                "Ignoring candidate for {} (state {:?}, connectivity {:?})",
                self.peer_id,
                self.state(),
                self.connectivity
            );
            return;
        }

        let Ok(session) = self.session() else {
            return;
        };
        if let Err(e) = session.add_ice_candidate(&message.candidate).await {
            warn!("Failed to add ICE candidate for {}: {}", self.peer_id, e);
        }
    }

    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        if self.is_terminal() {
            debug!("Engine event for closed connection {} dropped", self.connection_id);
            return;
        }

        match event {
            EngineEvent::LocalCandidate(candidate) => {
                self.signaling
                    .send_candidate(
                        self.peer_id.clone(),
                        self.connection_id.clone(),
                        self.kind(),
                        candidate,
                    )
                    .await;
            }

            EngineEvent::ConnectivityChanged(state) => {
                info!("Connectivity for {}: {:?}", self.peer_id, state);
                self.connectivity = state;
                match state {
                    ConnectivityState::Connected | ConnectivityState::Completed => {
                        if self.state() == ConnectionState::AnswerSent {
                            self.set_open().await;
                        }
                    }
                    ConnectivityState::Failed => {
                        self.fail(&NegotiationError::Connectivity("failed")).await
                    }
                    ConnectivityState::Disconnected => {
                        self.fail(&NegotiationError::Connectivity("disconnected")).await
                    }
                    ConnectivityState::Closed => self.close().await,
                    ConnectivityState::New | ConnectivityState::Checking => {}
                }
            }

            EngineEvent::StreamAdded(stream) => {
                self.listener.on_stream_added(&self.peer_id, &stream).await;
                self.remote_streams.push(stream);
            }

            EngineEvent::StreamRemoved(stream) => {
                self.remote_streams.retain(|s| s != &stream);
                self.listener.on_stream_removed(&self.peer_id, &stream).await;
            }
        }
    }

    async fn set_open(&self) {
        self.set_state(ConnectionState::Open);
        info!("Connection to {} open ({})", self.peer_id, self.connection_id);
        self.listener.on_open(&self.peer_id).await;
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let local = self.local_stream.take();
        let remote = std::mem::take(&mut self.remote_streams);
        if let Some(session) = self.session.take() {
            if let Some(stream) = local {
                session.release_stream(&stream).await;
            }
            for stream in &remote {
                session.release_stream(stream).await;
            }
            session.dispose().await;
        }
    }

    /// Idempotent. Releases streams, disposes the engine session, `Closed`.
    pub async fn close(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.release().await;
        self.set_state(ConnectionState::Closed);
        info!("Connection to {} closed", self.peer_id);
        self.listener.on_close(&self.peer_id).await;
    }

    async fn fail(&mut self, error: &NegotiationError) {
        if self.is_terminal() {
            return;
        }
        error!("Connection to {} failed: {}", self.peer_id, error);
        self.release().await;
        self.set_state(ConnectionState::Error);
        self.listener.on_error(&self.peer_id, error).await;
    }
}
