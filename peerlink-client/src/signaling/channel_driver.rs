use crate::config::SessionConfig;
use crate::error::ConnectError;
use crate::signaling::channel_event::ChannelEvent;
use crate::signaling::channel_state::ChannelState;
use crate::signaling::ws_connector::{ChannelConnector, ChannelLink};
use peerlink_core::{PeerId, SignalingMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

enum Flow {
    Continue,
    Stop,
}

/// Reads frames until OPEN. Pings are answered, routed frames that arrive
/// early are forwarded, rejection frames end the handshake.
pub(crate) async fn handshake(
    link: &mut ChannelLink,
    events: &mpsc::Sender<ChannelEvent>,
) -> Result<(), ConnectError> {
    loop {
        let Some(raw) = link.incoming.recv().await else {
            return Err(ConnectError::ChannelRejected(
                "channel closed before OPEN".to_owned(),
            ));
        };

        match SignalingMessage::decode(&raw) {
            Ok(SignalingMessage::Open { .. }) => return Ok(()),
            Ok(SignalingMessage::Ping) => {
                let _ = link.outgoing.send(SignalingMessage::Pong.encode());
            }
            Ok(SignalingMessage::Close { src: None }) => {
                return Err(ConnectError::ChannelRejected("closed by server".to_owned()));
            }
            Ok(SignalingMessage::Error { reason }) => {
                return Err(ConnectError::ChannelRejected(reason));
            }
            Ok(SignalingMessage::IdTaken) => {
                return Err(ConnectError::ChannelRejected("id taken".to_owned()));
            }
            Ok(SignalingMessage::InvalidKey) => {
                return Err(ConnectError::ChannelRejected("invalid key".to_owned()));
            }
            Ok(message) => {
                let _ = events.send(ChannelEvent::Message(message)).await;
            }
            Err(e) => debug!("Dropping frame before OPEN: {}", e),
        }
    }
}

/// Единственная задача, которая пишет в канал и читает из него.
pub(crate) struct ChannelDriver {
    pub link: ChannelLink,
    pub url: String,
    pub config: SessionConfig,
    pub connector: Arc<dyn ChannelConnector>,
    pub state: Arc<watch::Sender<ChannelState>>,
    pub outbound: Arc<Mutex<mpsc::UnboundedReceiver<SignalingMessage>>>,
    pub events: mpsc::Sender<ChannelEvent>,
    pub shutdown: oneshot::Receiver<()>,
    pub local_id: PeerId,
}

impl ChannelDriver {
    pub async fn run(mut self) {
        info!("Signaling driver started for {}", self.local_id);

        let outbound = Arc::clone(&self.outbound);
        let mut outbound = outbound.lock().await;
        let mut queue: VecDeque<String> = VecDeque::new();

        let mut spacing = time::interval(self.config.send_spacing);
        spacing.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    info!("Signaling channel disconnected by client");
                    self.state.send_replace(ChannelState::Disconnected);
                    break;
                }

                msg = outbound.recv() => {
                    match msg {
                        Some(m) => queue.push_back(m.encode()),
                        None => {
                            warn!("Outbound queue closed. Stopping driver.");
                            self.state.send_replace(ChannelState::Disconnected);
                            break;
                        }
                    }
                }

                _ = spacing.tick(), if !queue.is_empty() => {
                    let Some(frame) = queue.pop_front() else { continue };
                    if let Err(mpsc::error::SendError(frame)) = self.link.outgoing.send(frame) {
                        queue.push_front(frame);
                    }
                }

                frame = self.link.incoming.recv() => {
                    let flow = match frame {
                        Some(raw) => self.handle_frame(&raw).await,
                        None => self.reconnect().await,
                    };
                    if let Flow::Stop = flow {
                        break;
                    }
                }
            }
        }

        info!("Signaling driver finished ({} frames left unsent)", queue.len());
    }

    async fn handle_frame(&mut self, raw: &str) -> Flow {
        let message = match SignalingMessage::decode(raw) {
            Ok(m) => m,
            Err(e) if e.is_unknown_type() => {
                debug!("Dropping frame: {}", e);
                return Flow::Continue;
            }
            Err(e) => {
                warn!("Invalid frame from signaling server: {}", e);
                return Flow::Continue;
            }
        };

        match message {
            SignalingMessage::Ping => {
                let _ = self.link.outgoing.send(SignalingMessage::Pong.encode());
                Flow::Continue
            }
            SignalingMessage::Open { .. } => {
                debug!("Ignoring repeated OPEN");
                Flow::Continue
            }
            SignalingMessage::Close { src: None } => self.terminate(None).await,
            SignalingMessage::Error { reason } => self.terminate(Some(reason)).await,
            SignalingMessage::IdTaken => self.terminate(Some("id taken".to_owned())).await,
            SignalingMessage::InvalidKey => self.terminate(Some("invalid key".to_owned())).await,
            other => {
                if self.events.send(ChannelEvent::Message(other)).await.is_err() {
                    warn!("Session loop gone. Stopping driver.");
                    return Flow::Stop;
                }
                Flow::Continue
            }
        }
    }

    async fn terminate(&mut self, reason: Option<String>) -> Flow {
        match &reason {
            Some(r) => error!("Signaling server closed the channel: {}", r),
            None => info!("Signaling server closed the channel"),
        }
        self.state.send_replace(ChannelState::Disconnected);
        let _ = self.events.send(ChannelEvent::Closed { reason }).await;
        Flow::Stop
    }

    async fn reconnect(&mut self) -> Flow {
        let policy = self.config.reconnect;
        warn!("Signaling channel lost, reconnecting as {}", self.local_id);

        let mut attempt = 0;
        while policy.allows(attempt) {
            self.state
                .send_replace(ChannelState::Reconnecting { attempt });
            let _ = self.events.send(ChannelEvent::Reconnecting { attempt }).await;

            tokio::select! {
                _ = time::sleep(policy.delay_for(attempt)) => {}
                _ = &mut self.shutdown => {
                    self.state.send_replace(ChannelState::Disconnected);
                    return Flow::Stop;
                }
            }

            let connector = Arc::clone(&self.connector);
            let events = self.events.clone();
            let url = self.url.clone();
            let open = async move {
                let mut link = connector
                    .connect(&url)
                    .await
                    .map_err(|e| ConnectError::ChannelRejected(e.to_string()))?;
                handshake(&mut link, &events).await?;
                Ok::<_, ConnectError>(link)
            };

            let result = tokio::select! {
                r = time::timeout(self.config.open_timeout, open) => r,
                _ = &mut self.shutdown => {
                    self.state.send_replace(ChannelState::Disconnected);
                    return Flow::Stop;
                }
            };

            match result {
                Ok(Ok(link)) => {
                    info!("Signaling channel reopened after {} attempt(s)", attempt + 1);
                    self.link = link;
                    self.state.send_replace(ChannelState::Open);
                    let _ = self.events.send(ChannelEvent::Reopened).await;
                    return Flow::Continue;
                }
                Ok(Err(e)) => warn!("Reconnect attempt {} failed: {}", attempt, e),
                Err(_) => warn!("Reconnect attempt {} timed out", attempt),
            }

            attempt += 1;
        }

        error!("Giving up on signaling channel after {} attempts", attempt);
        self.state.send_replace(ChannelState::Disconnected);
        let _ = self
            .events
            .send(ChannelEvent::Failed(ConnectError::ReconnectExhausted {
                attempts: attempt,
            }))
            .await;
        Flow::Stop
    }
}
