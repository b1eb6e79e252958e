pub use peerlink_core::{PeerId, SignalingMessage};

pub mod model {
    pub use peerlink_core::model::*;
}

pub mod sdp {
    pub use peerlink_core::sdp::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use peerlink_client::*;
}
