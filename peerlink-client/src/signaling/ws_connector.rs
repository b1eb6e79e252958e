use crate::error::TransportError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Одно физическое соединение с сигнальным сервером в виде пары очередей.
/// `incoming` закрывается, когда соединение потеряно.
pub struct ChannelLink {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

impl ChannelLink {
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<String>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Открывает физический канал по готовому URL.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<ChannelLink, TransportError>;
}

#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<ChannelLink, TransportError> {
        let (socket, _response) = connect_async(url).await?;
        info!("WebSocket connected: {}", url);

        let (mut sender, mut receiver) = socket.split();
        let (link, mut out_rx, in_tx) = ChannelLink::pair();

        let mut send_task = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let mut recv_task = tokio::spawn(async move {
            while let Some(frame) = receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket read failed: {}", e);
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            tokio::select! {
                _ = (&mut send_task) => recv_task.abort(),
                _ = (&mut recv_task) => send_task.abort(),
            };
            debug!("WebSocket link finished");
        });

        Ok(link)
    }
}
