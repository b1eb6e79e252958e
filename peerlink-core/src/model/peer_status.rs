use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};

/// Классификация пира в ответе discovery, по локальному состоянию сессии.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Talking,
    Incoming,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub peer_id: PeerId,
    pub status: PeerStatus,
}
