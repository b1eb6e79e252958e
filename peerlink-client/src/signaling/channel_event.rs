use crate::error::ConnectError;
use peerlink_core::SignalingMessage;

/// События канала для цикла сессии, в порядке получения.
#[derive(Debug)]
pub enum ChannelEvent {
    /// Decoded inbound frame. Ping and the handshake frames never show up here.
    Message(SignalingMessage),

    Reconnecting { attempt: u32 },

    Reopened,

    /// Closed by the server. `reason` is set for ERROR, ID-TAKEN and INVALID-KEY.
    Closed { reason: Option<String> },

    /// Reconnect budget exhausted. Emitted once.
    Failed(ConnectError),
}
