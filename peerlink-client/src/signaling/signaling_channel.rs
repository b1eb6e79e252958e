use crate::config::{SessionConfig, random_token};
use crate::error::ConnectError;
use crate::signaling::channel_driver::{ChannelDriver, handshake};
use crate::signaling::channel_event::ChannelEvent;
use crate::signaling::channel_state::ChannelState;
use crate::signaling::rendezvous::RendezvousService;
use crate::signaling::signaling_output::SignalingOutput;
use crate::signaling::ws_connector::ChannelConnector;
use async_trait::async_trait;
use peerlink_core::{
    AnswerMessage, CandidateMessage, ConnectionId, ConnectionKind, IceCandidate, OfferMessage,
    PeerId, SessionDescription, SignalingMessage,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time;
use tracing::{debug, info, warn};

/// Постоянное соединение с сигнальным сервером.
///
/// `start` получает id и открывает канал, дальше всю работу с сокетом
/// делает одна фоновая задача (`ChannelDriver`): отправка очереди с
/// интервалом `send_spacing`, разбор входящих кадров, переподключение.
pub struct SignalingChannel {
    config: SessionConfig,
    rendezvous: Arc<dyn RendezvousService>,
    connector: Arc<dyn ChannelConnector>,
    state: Arc<watch::Sender<ChannelState>>,
    local_id: watch::Sender<Option<PeerId>>,
    outbound_tx: mpsc::UnboundedSender<SignalingMessage>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<SignalingMessage>>>,
    events: mpsc::Sender<ChannelEvent>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    stopped: AtomicBool,
}

impl SignalingChannel {
    pub fn new(
        config: SessionConfig,
        rendezvous: Arc<dyn RendezvousService>,
        connector: Arc<dyn ChannelConnector>,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (local_id, _) = watch::channel(None);

        let channel = Self {
            config,
            rendezvous,
            connector,
            state: Arc::new(state),
            local_id,
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            events,
            shutdown: Mutex::new(None),
            stopped: AtomicBool::new(true),
        };
        (channel, events_rx)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.local_id.borrow().clone()
    }

    /// Acquire an identity, open the channel and wait for OPEN.
    pub async fn start(&self) -> Result<PeerId, ConnectError> {
        {
            // `stopped` меняется только под этим замком, см. `disconnect`
            let _guard = self.shutdown.lock().await;
            let claimed = self.state.send_if_modified(|state| {
                if *state == ChannelState::Disconnected {
                    *state = ChannelState::AcquiringIdentity;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                return Err(ConnectError::AlreadyStarted);
            }
            self.stopped.store(false, Ordering::SeqCst);
        }

        match self.open().await {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!("Signaling channel failed to start: {}", e);
                self.state.send_replace(ChannelState::Disconnected);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<PeerId, ConnectError> {
        let identity = time::timeout(
            self.config.identity_timeout,
            self.rendezvous.acquire_identity(),
        )
        .await
        .map_err(|_| ConnectError::Timeout)?
        .map_err(|e| ConnectError::ServiceUnavailable(e.to_string()))?;

        info!("Acquired identity {}", identity.peer_id);
        self.state.send_replace(ChannelState::ChannelConnecting);

        let token = identity.credential.clone().unwrap_or_else(random_token);
        let url = self
            .config
            .server
            .channel_url(&self.config.api_key, &identity.peer_id, &token);

        let connect = async {
            let mut link = self
                .connector
                .connect(&url)
                .await
                .map_err(|e| ConnectError::ChannelRejected(e.to_string()))?;
            handshake(&mut link, &self.events).await?;
            Ok::<_, ConnectError>(link)
        };
        let link = time::timeout(self.config.open_timeout, connect)
            .await
            .map_err(|_| ConnectError::Timeout)??;

        // A disconnect that won the lock first must not be undone here
        let mut shutdown = self.shutdown.lock().await;
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ConnectError::ChannelRejected(
                "disconnected while opening".to_owned(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *shutdown = Some(shutdown_tx);

        self.local_id.send_replace(Some(identity.peer_id.clone()));
        self.state.send_replace(ChannelState::Open);
        info!("Signaling channel open as {}", identity.peer_id);

        let driver = ChannelDriver {
            link,
            url,
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            state: Arc::clone(&self.state),
            outbound: Arc::clone(&self.outbound_rx),
            events: self.events.clone(),
            shutdown: shutdown_rx,
            local_id: identity.peer_id.clone(),
        };
        tokio::spawn(driver.run());
        drop(shutdown);

        Ok(identity.peer_id)
    }

    /// Queue a message. Frames queued while not open go out after the next reopen.
    pub fn send(&self, message: SignalingMessage) {
        debug!("Queueing {}", message.tag());
        if self.outbound_tx.send(message).is_err() {
            warn!("Outbound queue closed, message dropped");
        }
    }

    /// Close the channel and suppress reconnects. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let mut shutdown = self.shutdown.lock().await;
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disconnecting signaling channel");

        if let Some(tx) = shutdown.take() {
            let _ = tx.send(());
        }
        self.state.send_replace(ChannelState::Disconnected);
    }

    pub async fn list_peers(&self) -> Result<Vec<PeerId>, crate::error::RendezvousError> {
        self.rendezvous.list_peers().await
    }

    fn source(&self) -> Option<PeerId> {
        let id = self.local_id();
        if id.is_none() {
            warn!("No local identity yet, dropping outbound signal");
        }
        id
    }
}

#[async_trait]
impl SignalingOutput for SignalingChannel {
    async fn send_offer(
        &self,
        peer_id: PeerId,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        sdp: SessionDescription,
    ) {
        let Some(src) = self.source() else { return };
        self.send(SignalingMessage::Offer(OfferMessage {
            src,
            dst: Some(peer_id),
            connection_id,
            kind,
            sdp,
        }));
    }

    async fn send_answer(
        &self,
        peer_id: PeerId,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        sdp: SessionDescription,
    ) {
        let Some(src) = self.source() else { return };
        self.send(SignalingMessage::Answer(AnswerMessage {
            src,
            dst: Some(peer_id),
            connection_id,
            kind: Some(kind),
            sdp,
        }));
    }

    async fn send_candidate(
        &self,
        peer_id: PeerId,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        candidate: IceCandidate,
    ) {
        let Some(src) = self.source() else { return };
        self.send(SignalingMessage::Candidate(CandidateMessage {
            src,
            dst: Some(peer_id),
            connection_id,
            kind: Some(kind),
            candidate,
        }));
    }
}
