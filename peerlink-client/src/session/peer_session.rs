use crate::config::SessionConfig;
use crate::connection::{ConnectionHandle, ConnectionListener, ConnectionState};
use crate::engine::MediaEngine;
use crate::error::{AnswerError, CallError, ConnectError, RendezvousError, SessionError};
use crate::session::context::SessionContext;
use crate::session::session_command::SessionCommand;
use crate::session::session_listener::SessionListener;
use crate::session::session_loop::SessionLoop;
use crate::signaling::{
    ChannelConnector, ChannelState, HttpRendezvous, RendezvousService, SignalingChannel,
    WsConnector,
};
use peerlink_core::{ConnectionConfig, PeerEntry, PeerId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

/// Фасад сессии: владеет сигнальным каналом и циклом сессии.
///
/// Все операции над таблицами уходят командами в `SessionLoop`, поэтому
/// `call`, пришедший одновременно с входящим OFFER, обрабатывается строго
/// до или после него.
pub struct PeerSession {
    channel: Arc<SignalingChannel>,
    commands: mpsc::Sender<SessionCommand>,
    listener: Arc<dyn SessionListener>,
    context: SessionContext,
    destroyed: AtomicBool,
}

impl PeerSession {
    /// Session over the HTTP rendezvous service and a WebSocket channel.
    pub fn new(
        config: SessionConfig,
        engine: Arc<dyn MediaEngine>,
        listener: Arc<dyn SessionListener>,
    ) -> Result<Self, RendezvousError> {
        let rendezvous = Arc::new(HttpRendezvous::new(&config)?);
        Ok(Self::with_services(
            config,
            rendezvous,
            Arc::new(WsConnector),
            engine,
            listener,
        ))
    }

    /// Spawns the session loop, so it must run inside a tokio runtime.
    pub fn with_services(
        config: SessionConfig,
        rendezvous: Arc<dyn RendezvousService>,
        connector: Arc<dyn ChannelConnector>,
        engine: Arc<dyn MediaEngine>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        let buffer = config.event_buffer;
        let (channel, channel_rx) = SignalingChannel::new(config, rendezvous, connector);
        let channel = Arc::new(channel);
        let context = SessionContext::default();

        let (session_loop, commands) = SessionLoop::new(
            Arc::clone(&channel),
            channel_rx,
            engine,
            Arc::clone(&listener),
            context.clone(),
            buffer,
        );
        tokio::spawn(session_loop.run());

        Self {
            channel,
            commands,
            listener,
            context,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Start the signaling channel. The outcome goes to the listener and back to the caller.
    pub async fn connect(&self) -> Result<PeerId, ConnectError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ConnectError::ChannelRejected("session destroyed".to_owned()));
        }

        match self.channel.start().await {
            Ok(peer_id) => {
                info!("Connected as {}", peer_id);
                self.listener.on_connected(&self.context, &peer_id).await;
                Ok(peer_id)
            }
            Err(e) => {
                error!("Connect failed: {}", e);
                self.listener
                    .on_error(&self.context, &SessionError::Connect(e.clone()))
                    .await;
                Err(e)
            }
        }
    }

    pub async fn call(
        &self,
        peer_id: impl Into<PeerId>,
        config: ConnectionConfig,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<ConnectionHandle, CallError> {
        let (reply, rx) = oneshot::channel();
        let cmd = SessionCommand::Call {
            peer_id: peer_id.into(),
            config,
            listener,
            reply,
        };
        if self.destroyed.load(Ordering::SeqCst) || self.commands.send(cmd).await.is_err() {
            return Err(CallError::SessionClosed);
        }
        rx.await.unwrap_or(Err(CallError::SessionClosed))
    }

    pub async fn answer(
        &self,
        peer_id: impl Into<PeerId>,
        config: ConnectionConfig,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<ConnectionHandle, AnswerError> {
        let (reply, rx) = oneshot::channel();
        let cmd = SessionCommand::Answer {
            peer_id: peer_id.into(),
            config,
            listener,
            reply,
        };
        if self.destroyed.load(Ordering::SeqCst) || self.commands.send(cmd).await.is_err() {
            return Err(AnswerError::SessionClosed);
        }
        rx.await.unwrap_or(Err(AnswerError::SessionClosed))
    }

    /// `true` if a connection to `peer_id` existed and was closed.
    pub async fn hangup(&self, peer_id: impl Into<PeerId>) -> bool {
        let (reply, rx) = oneshot::channel();
        let cmd = SessionCommand::Hangup {
            peer_id: peer_id.into(),
            connection_id: None,
            reply,
        };
        if self.destroyed.load(Ordering::SeqCst) || self.commands.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Discovery list without our own id, classified against the local tables.
    pub async fn list_peers(&self) -> Result<Vec<PeerEntry>, SessionError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        let peers = self.channel.list_peers().await?;

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Classify { peers, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Close every connection, clear both tables and disconnect. Idempotent.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Destroying peer session");

        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Destroy { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        } else {
            self.channel.disconnect().await;
        }
    }

    pub fn connection_state(&self, peer_id: &PeerId) -> Option<ConnectionState> {
        self.context.connection_state(peer_id)
    }

    pub fn active_peers(&self) -> Vec<PeerId> {
        self.context.active_peers()
    }

    pub fn has_offer(&self, peer_id: &PeerId) -> bool {
        self.context.has_offer(peer_id)
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.channel.local_id()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }
}
