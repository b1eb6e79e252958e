mod connection;
mod peer;
mod peer_status;
mod session_description;
mod signaling;

pub use connection::{
    BitrateHints, CodecPreferences, ConnectionConfig, ConnectionKind, IceServerConfig, MediaKinds,
    MediaSource,
};
pub use peer::{ConnectionId, PeerId};
pub use peer_status::{PeerEntry, PeerStatus};
pub use session_description::{IceCandidate, SdpType, SessionDescription};
pub use signaling::{AnswerMessage, CandidateMessage, OfferMessage, SignalingMessage};
