mod connection_handle;
mod connection_listener;
mod connection_state;
mod media_connection;

pub use connection_handle::*;
pub use connection_listener::*;
pub use connection_state::*;
pub use media_connection::*;
