/// Состояния согласования одного соединения.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    OfferSent,
    OfferReceived,
    AnswerSent,
    AnswerReceived,
    Open,
    Closed,
    Error,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Мы позвонили (`call`).
    Outbound,
    /// Мы ответили на offer (`answer`).
    Inbound,
}

/// ICE состояние, как его сообщает движок.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectivityState {
    /// Candidates arriving after this point are ignored.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Closed)
    }
}
