mod channel_driver;
mod channel_event;
mod channel_state;
mod reconnect_policy;
mod rendezvous;
mod signaling_channel;
mod signaling_output;
mod ws_connector;

pub use channel_event::*;
pub use channel_state::*;
pub use reconnect_policy::*;
pub use rendezvous::*;
pub use signaling_channel::*;
pub use signaling_output::*;
pub use ws_connector::*;
