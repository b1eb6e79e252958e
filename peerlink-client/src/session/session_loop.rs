use crate::connection::{ConnectionHandle, ConnectionListener, MediaConnection};
use crate::engine::{EngineEventSink, EngineNotice, MediaEngine};
use crate::error::{AnswerError, CallError, SessionError};
use crate::session::context::SessionContext;
use crate::session::session_command::SessionCommand;
use crate::session::session_listener::SessionListener;
use crate::signaling::{ChannelEvent, SignalingChannel, SignalingOutput};
use peerlink_core::{
    AnswerMessage, CandidateMessage, ConnectionConfig, ConnectionId, OfferMessage, PeerEntry,
    PeerId, PeerStatus, SignalingMessage,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Цикл сессии: единственный владелец таблицы соединений и таблицы
/// ожидающих offer. Все публичные операции и разбор входящих сообщений
/// выполняются здесь по очереди.
pub struct SessionLoop {
    channel: Arc<SignalingChannel>,
    engine: Arc<dyn MediaEngine>,
    listener: Arc<dyn SessionListener>,
    context: SessionContext,
    connections: HashMap<PeerId, MediaConnection>,
    pending_offers: HashMap<PeerId, OfferMessage>,
    command_rx: mpsc::Receiver<SessionCommand>,
    command_tx: mpsc::WeakSender<SessionCommand>,
    channel_rx: mpsc::Receiver<ChannelEvent>,
    engine_rx: mpsc::Receiver<EngineNotice>,
    engine_tx: mpsc::Sender<EngineNotice>,
}

impl SessionLoop {
    pub fn new(
        channel: Arc<SignalingChannel>,
        channel_rx: mpsc::Receiver<ChannelEvent>,
        engine: Arc<dyn MediaEngine>,
        listener: Arc<dyn SessionListener>,
        context: SessionContext,
        buffer: usize,
    ) -> (Self, mpsc::Sender<SessionCommand>) {
        let (command_tx, command_rx) = mpsc::channel(buffer.max(1));
        let (engine_tx, engine_rx) = mpsc::channel(buffer.max(1));

        let session = Self {
            channel,
            engine,
            listener,
            context,
            connections: HashMap::new(),
            pending_offers: HashMap::new(),
            command_rx,
            command_tx: command_tx.downgrade(),
            channel_rx,
            engine_rx,
            engine_tx,
        };
        (session, command_tx)
    }

    pub async fn run(mut self) {
        info!("Session loop started");
        let mut channel_alive = true;

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Destroy { reply }) => {
                            self.shutdown().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down session.");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                evt = self.channel_rx.recv(), if channel_alive => {
                    match evt {
                        Some(e) => self.handle_channel_event(e).await,
                        None => {
                            warn!("Signaling event channel closed unexpectedly");
                            channel_alive = false;
                        }
                    }
                }

                notice = self.engine_rx.recv() => {
                    if let Some(n) = notice {
                        self.handle_engine_notice(n).await;
                    }
                }
            }
        }

        info!("Session loop finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        debug!("Session command: {:?}", cmd);
        match cmd {
            SessionCommand::Call {
                peer_id,
                config,
                listener,
                reply,
            } => {
                let result = self.call(peer_id, config, listener).await;
                let _ = reply.send(result);
            }

            SessionCommand::Answer {
                peer_id,
                config,
                listener,
                reply,
            } => {
                let result = self.answer(peer_id, config, listener).await;
                let _ = reply.send(result);
            }

            SessionCommand::Hangup {
                peer_id,
                connection_id,
                reply,
            } => {
                let closed = self.hangup(&peer_id, connection_id.as_ref()).await;
                let _ = reply.send(closed);
            }

            SessionCommand::Classify { peers, reply } => {
                let _ = reply.send(self.classify(peers));
            }

            SessionCommand::Destroy { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    fn signaling(&self) -> Arc<dyn SignalingOutput> {
        self.channel.clone()
    }

    fn sink_for(&self, peer_id: &PeerId, connection_id: &ConnectionId) -> EngineEventSink {
        EngineEventSink::new(
            peer_id.clone(),
            connection_id.clone(),
            self.engine_tx.clone(),
        )
    }

    /// Handles outliving the session get a closed command channel.
    fn handle_for(&self, connection: &MediaConnection) -> ConnectionHandle {
        let commands = self
            .command_tx
            .upgrade()
            .unwrap_or_else(|| mpsc::channel(1).0);
        ConnectionHandle::new(
            connection.peer_id().clone(),
            connection.connection_id().clone(),
            connection.direction(),
            connection.subscribe(),
            commands,
        )
    }

    /// Keeps the connection if negotiation left it alive.
    fn register(&mut self, connection: MediaConnection) {
        if connection.is_terminal() {
            return;
        }
        let peer_id = connection.peer_id().clone();
        self.context
            .track_connection(peer_id.clone(), connection.subscribe());
        self.connections.insert(peer_id, connection);
    }

    async fn call(
        &mut self,
        peer_id: PeerId,
        config: ConnectionConfig,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<ConnectionHandle, CallError> {
        if !self.channel.is_open() {
            return Err(CallError::ChannelNotOpen);
        }
        if self.connections.contains_key(&peer_id) {
            return Err(CallError::AlreadyConnected(peer_id));
        }

        info!("Calling {}", peer_id);
        let mut connection =
            MediaConnection::outbound(peer_id, config, self.signaling(), listener);
        let sink = self.sink_for(connection.peer_id(), connection.connection_id());
        let handle = self.handle_for(&connection);

        if let Err(e) = connection.create_offer(self.engine.as_ref(), sink).await {
            warn!("Call to {} failed during negotiation: {}", handle.peer_id(), e);
        }
        self.register(connection);
        Ok(handle)
    }

    async fn answer(
        &mut self,
        peer_id: PeerId,
        config: ConnectionConfig,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<ConnectionHandle, AnswerError> {
        if !self.channel.is_open() {
            return Err(AnswerError::ChannelNotOpen);
        }
        if self.connections.contains_key(&peer_id) {
            return Err(AnswerError::AlreadyConnected(peer_id));
        }
        let Some(offer) = self.pending_offers.remove(&peer_id) else {
            return Err(AnswerError::NoPendingOffer(peer_id));
        };
        self.context.forget_offer(&peer_id);

        info!("Answering {} ({})", peer_id, offer.connection_id);
        let mut connection =
            MediaConnection::inbound(&offer, config, self.signaling(), listener);
        let sink = self.sink_for(connection.peer_id(), connection.connection_id());
        let handle = self.handle_for(&connection);

        if let Err(e) = connection
            .create_answer(self.engine.as_ref(), sink, &offer)
            .await
        {
            warn!("Answer to {} failed during negotiation: {}", peer_id, e);
        }
        self.register(connection);
        Ok(handle)
    }

    async fn hangup(&mut self, peer_id: &PeerId, connection_id: Option<&ConnectionId>) -> bool {
        let matches = match (self.connections.get(peer_id), connection_id) {
            (Some(c), Some(id)) => c.connection_id() == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return false;
        }

        let Some(mut connection) = self.connections.remove(peer_id) else {
            return false;
        };
        self.context.forget_connection(peer_id);
        info!("Hanging up {}", peer_id);
        connection.close().await;
        true
    }

    fn classify(&self, peers: Vec<PeerId>) -> Vec<PeerEntry> {
        let local_id = self.channel.local_id();

        peers
            .into_iter()
            .filter(|p| !local_id.as_ref().is_some_and(|own| own.same_as(p.as_str())))
            .map(|peer_id| {
                let status = if self
                    .connections
                    .get(&peer_id)
                    .is_some_and(|c| !c.is_terminal())
                {
                    PeerStatus::Talking
                } else if self.pending_offers.contains_key(&peer_id) {
                    PeerStatus::Incoming
                } else {
                    PeerStatus::Idle
                };
                PeerEntry { peer_id, status }
            })
            .collect()
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(message) => self.dispatch(message).await,

            ChannelEvent::Reconnecting { attempt } => {
                info!(
                    "Signaling reconnecting (attempt {}), keeping {} connection(s)",
                    attempt,
                    self.connections.len()
                );
            }

            ChannelEvent::Reopened => info!("Signaling channel reopened"),

            ChannelEvent::Closed { reason } => {
                if let Some(reason) = reason {
                    self.listener
                        .on_error(&self.context, &SessionError::ChannelClosed(reason))
                        .await;
                }
                self.listener.on_disconnected(&self.context).await;
            }

            ChannelEvent::Failed(e) => {
                self.listener
                    .on_error(&self.context, &SessionError::Connect(e))
                    .await;
                self.listener.on_disconnected(&self.context).await;
            }
        }
    }

    async fn dispatch(&mut self, message: SignalingMessage) {
        match message {
            SignalingMessage::Offer(offer) => self.on_offer(offer).await,
            SignalingMessage::Answer(answer) => self.on_answer(answer).await,
            SignalingMessage::Candidate(candidate) => self.on_candidate(candidate).await,

            SignalingMessage::Close { src: Some(peer_id) }
            | SignalingMessage::Leave { src: Some(peer_id) } => {
                info!("Peer {} left", peer_id);
                self.teardown_peer(&peer_id).await;
            }

            SignalingMessage::Expire { src } => {
                info!("Signal to {:?} expired before delivery", src);
            }

            other => debug!("Ignoring {} in session", other.tag()),
        }
    }

    async fn on_offer(&mut self, offer: OfferMessage) {
        let peer_id = offer.src.clone();
        info!("Incoming offer from {} ({})", peer_id, offer.connection_id);

        self.context
            .track_offer(peer_id.clone(), offer.connection_id.clone());
        self.pending_offers.insert(peer_id.clone(), offer);

        self.listener.on_incoming(&self.context, &peer_id).await;
    }

    /// The connection that owns `connection_id` for `peer_id`, if any.
    fn routed(
        &mut self,
        peer_id: &PeerId,
        connection_id: &ConnectionId,
    ) -> Option<&mut MediaConnection> {
        self.connections
            .get_mut(peer_id)
            .filter(|c| c.connection_id() == connection_id)
    }

    async fn on_answer(&mut self, answer: AnswerMessage) {
        let Some(connection) = self.routed(&answer.src, &answer.connection_id) else {
            debug!(
                "Dropping answer from {} ({}): no such connection",
                answer.src, answer.connection_id
            );
            return;
        };
        if let Err(e) = connection.handle_answer(&answer).await {
            warn!("Answer from {} not applied: {}", answer.src, e);
        }
        self.reap(&answer.src).await;
    }

    async fn on_candidate(&mut self, candidate: CandidateMessage) {
        let Some(connection) = self.routed(&candidate.src, &candidate.connection_id) else {
            debug!(
                "Dropping candidate from {} ({}): no such connection",
                candidate.src, candidate.connection_id
            );
            return;
        };
        connection.handle_candidate(&candidate).await;
    }

    async fn handle_engine_notice(&mut self, notice: EngineNotice) {
        let Some(connection) = self.routed(&notice.peer_id, &notice.connection_id) else {
            debug!("Engine event for stale connection {} dropped", notice.connection_id);
            return;
        };
        connection.handle_engine_event(notice.event).await;
        self.reap(&notice.peer_id).await;
    }

    /// Drops a connection that closed or failed on its own.
    async fn reap(&mut self, peer_id: &PeerId) {
        let finished = self
            .connections
            .get(peer_id)
            .is_some_and(|c| c.is_terminal());
        if !finished {
            return;
        }

        self.connections.remove(peer_id);
        self.context.forget_connection(peer_id);
        self.listener.on_hangup(&self.context, peer_id).await;
    }

    async fn teardown_peer(&mut self, peer_id: &PeerId) {
        if self.pending_offers.remove(peer_id).is_some() {
            self.context.forget_offer(peer_id);
        }

        let Some(mut connection) = self.connections.remove(peer_id) else {
            return;
        };
        self.context.forget_connection(peer_id);
        connection.close().await;
        self.listener.on_hangup(&self.context, peer_id).await;
    }

    async fn shutdown(&mut self) {
        info!("Destroying session ({} connection(s))", self.connections.len());

        for (_, mut connection) in self.connections.drain() {
            connection.close().await;
        }
        self.pending_offers.clear();
        self.context.clear();
        self.channel.disconnect().await;
    }
}
