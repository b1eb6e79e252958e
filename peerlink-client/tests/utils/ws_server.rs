use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Minimal rendezvous + relay server: hands out ids, lists peers, forwards
/// frames by `dst` with `src` filled in.
#[derive(Clone, Default)]
pub struct RelayServer {
    peers: Arc<DashMap<String, mpsc::UnboundedSender<Message>>>,
    next_id: Arc<AtomicUsize>,
}

#[derive(Deserialize)]
struct ChannelQuery {
    id: String,
    #[allow(dead_code)]
    key: String,
    #[allow(dead_code)]
    token: String,
}

impl RelayServer {
    /// Bind on a random local port and serve in the background.
    pub async fn spawn() -> anyhow::Result<SocketAddr> {
        let server = Self::default();
        let app = Router::new()
            .route("/{key}/id", get(identity))
            .route("/active/list/{key}", get(active_list))
            .route("/peerjs", get(ws_handler))
            .with_state(server);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("Relay server stopped: {}", e);
            }
        });
        Ok(addr)
    }

    fn relay(&self, src: &str, text: &str) {
        let Ok(mut frame) = serde_json::from_str::<Value>(text) else {
            warn!("Relay dropped invalid frame from {}", src);
            return;
        };
        let Some(dst) = frame.get("dst").and_then(Value::as_str).map(str::to_owned) else {
            return;
        };
        frame["src"] = Value::String(src.to_owned());

        match self.peers.get(&dst) {
            Some(peer) => {
                let _ = peer.send(Message::Text(frame.to_string().into()));
            }
            None => {
                let expire = serde_json::json!({ "type": "EXPIRE", "src": dst });
                if let Some(back) = self.peers.get(src) {
                    let _ = back.send(Message::Text(expire.to_string().into()));
                }
            }
        }
    }
}

async fn identity(Path(_key): Path<String>, State(server): State<RelayServer>) -> String {
    format!("peer-{}", server.next_id.fetch_add(1, Ordering::SeqCst))
}

async fn active_list(
    Path(_key): Path<String>,
    State(server): State<RelayServer>,
) -> Json<Vec<String>> {
    Json(server.peers.iter().map(|e| e.key().clone()).collect())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ChannelQuery>,
    State(server): State<RelayServer>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query.id, server))
}

async fn handle_socket(socket: WebSocket, peer_id: String, server: RelayServer) {
    info!("Relay: {} connected", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ = tx.send(Message::Text(r#"{"type":"OPEN"}"#.into()));
    server.peers.insert(peer_id.clone(), tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let server = server.clone();
        let peer_id = peer_id.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => server.relay(&peer_id, text.as_str()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    server.peers.remove(&peer_id);
    info!("Relay: {} disconnected", peer_id);
}
