use peerlink_core::IceServerConfig;
use serde::{Deserialize, Serialize};

/// Конфигурация для WebRTC движка.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun("stun:stun.l.google.com:19302")],
        }
    }
}
