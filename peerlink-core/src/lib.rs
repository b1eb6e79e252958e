pub mod error;
pub mod model;
pub mod sdp;

pub use error::DecodeError;
pub use model::*;
