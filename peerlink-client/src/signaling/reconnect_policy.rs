use crate::config::millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Задержка попытки `n` (с нуля): `base + n * step`, не более `max_attempts` попыток.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(with = "millis")]
    pub base: Duration,
    #[serde(with = "millis")]
    pub step: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            step: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base + self.step.saturating_mul(attempt)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}
