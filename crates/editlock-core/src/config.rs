//! Timing configuration for edit sessions.
//!
//! All values are milliseconds. The exact thresholds are tuning knobs, not
//! protocol contract; the runtime exposes every one of them as a flag.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default heartbeat interval (1 minute).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;

/// Default fallback lease-status poll interval (30 seconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Default idle check interval (10 seconds).
pub const DEFAULT_IDLE_CHECK_INTERVAL_MS: u64 = 10_000;

/// Default inactivity threshold (5 minutes).
pub const DEFAULT_INACTIVITY_THRESHOLD_MS: u64 = 300_000;

/// Default grace window before an unanswered inactivity prompt auto-resolves.
pub const DEFAULT_INACTIVITY_GRACE_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval between heartbeats while editing (default 60_000).
    pub heartbeat_interval_ms: u64,
    /// Interval of the fallback lease-status poll (default 30_000).
    pub poll_interval_ms: u64,
    /// Interval at which the activity tracker is consulted (default 10_000).
    pub idle_check_interval_ms: u64,
    /// Idle duration that triggers the inactivity prompt and suppresses
    /// heartbeats (default 300_000).
    pub inactivity_threshold_ms: u64,
    /// Time the inactivity prompt waits before auto-resolving (default 60_000).
    pub inactivity_grace_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_check_interval_ms: DEFAULT_IDLE_CHECK_INTERVAL_MS,
            inactivity_threshold_ms: DEFAULT_INACTIVITY_THRESHOLD_MS,
            inactivity_grace_ms: DEFAULT_INACTIVITY_GRACE_MS,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("idle_check_interval_ms", self.idle_check_interval_ms),
            ("inactivity_threshold_ms", self.inactivity_threshold_ms),
            ("inactivity_grace_ms", self.inactivity_grace_ms),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero { field });
        }
        if self.idle_check_interval_ms >= self.inactivity_threshold_ms {
            return Err(ConfigError::IdleCheckTooSlow {
                idle_check_ms: self.idle_check_interval_ms,
                threshold_ms: self.inactivity_threshold_ms,
            });
        }
        Ok(())
    }
}
