mod context;
mod peer_session;
mod session_command;
mod session_listener;
mod session_loop;

pub use context::*;
pub use peer_session::*;
pub use session_command::*;
pub use session_listener::*;
pub use session_loop::*;
