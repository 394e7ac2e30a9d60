// src/backoff.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay between failed attempts of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Retry right away.
    Immediate,
    Fixed { seconds: u64 },
    Exponential { base: u64, cap: u64 },
    Linear { increment: u64, cap: u64 },
}

impl BackoffStrategy {
    /// Delay before retrying, `attempt` being the number of attempts made so far.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = match self {
            BackoffStrategy::Immediate => 0,
            BackoffStrategy::Fixed { seconds } => *seconds,
            BackoffStrategy::Exponential { base, cap } => base.saturating_pow(attempt).min(*cap),
            BackoffStrategy::Linear { increment, cap } => {
                increment.saturating_mul(attempt as u64).min(*cap)
            }
        };
        Duration::from_secs(secs)
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential { base: 2, cap: 300 }
    }
}
