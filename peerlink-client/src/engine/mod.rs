mod engine_config;
mod engine_event;
mod media_engine;
mod webrtc_engine;

pub use engine_config::*;
pub use engine_event::*;
pub use media_engine::*;
pub use webrtc_engine::*;
