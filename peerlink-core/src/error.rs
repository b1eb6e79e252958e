use thiserror::Error;

/// Ошибки разбора входящего сигнального кадра.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("{0} frame without src")]
    MissingSource(&'static str),

    #[error("{0} frame without payload")]
    MissingPayload(&'static str),
}

impl DecodeError {
    /// Unknown tags are routine (newer servers), the channel drops them quietly.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}
