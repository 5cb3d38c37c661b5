//! Reconnect backoff for the push channel.
//!
//! Pure and testable: the caller sleeps for the returned delay.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Initial delay in milliseconds (default 1000).
    pub initial_ms: u64,
    /// Growth factor per consecutive failure (default 2.0).
    pub multiplier: f64,
    /// Cap in milliseconds (default 30000).
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            multiplier: 2.0,
            max_ms: 30_000,
        }
    }
}

/// Exponential backoff state for one reconnecting channel.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let raw = (self.policy.initial_ms as f64) * self.policy.multiplier.powi(self.attempt as i32);
        let ms = (raw as u64).min(self.policy.max_ms);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(ms)
    }

    /// A connection succeeded.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
