//! Activity tracker: last local user input and the derived idle window.

/// Records the timestamp (epoch ms) of the last local user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityTracker {
    last_activity_ms: u64,
}

impl ActivityTracker {
    /// Start tracking with `now_ms` counted as activity.
    pub fn new(now_ms: u64) -> Self {
        Self {
            last_activity_ms: now_ms,
        }
    }

    /// Record user input at `now_ms`. Out-of-order (older) timestamps are ignored.
    pub fn record(&mut self, now_ms: u64) {
        self.last_activity_ms = self.last_activity_ms.max(now_ms);
    }

    /// Force the idle clock back to zero at `now_ms`, even if a later
    /// timestamp was recorded.
    pub fn reset(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    /// Idle duration at `now_ms` (0 if the clock went backwards).
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms)
    }

    pub fn is_idle(&self, now_ms: u64, threshold_ms: u64) -> bool {
        self.idle_ms(now_ms) >= threshold_ms
    }
}
