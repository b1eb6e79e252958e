use crate::connection::connection_state::{ConnectionState, Direction};
use crate::session::SessionCommand;
use peerlink_core::{ConnectionId, PeerId};
use tokio::sync::{mpsc, oneshot, watch};

/// Невладеющий описатель соединения, которое живёт в таблице сессии.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    peer_id: PeerId,
    connection_id: ConnectionId,
    direction: Direction,
    state: watch::Receiver<ConnectionState>,
    commands: mpsc::Sender<SessionCommand>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        peer_id: PeerId,
        connection_id: ConnectionId,
        direction: Direction,
        state: watch::Receiver<ConnectionState>,
        commands: mpsc::Sender<SessionCommand>,
    ) -> Self {
        Self {
            peer_id,
            connection_id,
            direction,
            state,
            commands,
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

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Resolves with the first state matching `done`, or the last state if
    /// the connection is dropped first.
    pub async fn wait_for(&self, done: impl Fn(ConnectionState) -> bool) -> ConnectionState {
        let mut rx = self.state.clone();
        loop {
            let current = *rx.borrow_and_update();
            if done(current) {
                return current;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Hang up this connection. `false` if it was already gone or replaced.
    pub async fn hangup(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        let cmd = SessionCommand::Hangup {
            peer_id: self.peer_id.clone(),
            connection_id: Some(self.connection_id.clone()),
            reply,
        };
        if self.commands.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}
