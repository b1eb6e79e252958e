/// Состояние сигнального канала.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    AcquiringIdentity,
    ChannelConnecting,
    Open,
    /// Потеря соединения после `Open`; `attempt` считается с нуля.
    Reconnecting { attempt: u32 },
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}
