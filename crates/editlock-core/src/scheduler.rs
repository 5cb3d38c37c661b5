//! Per-session timer set.
//!
//! Timers are armed strictly from a [`TimerPlan`] derived from the session
//! phase, so every transition leaves exactly the timers that phase needs
//! and nothing outlives the session. Deadlines are epoch milliseconds; the
//! runtime sleeps until [`TimerSet::next_deadline`] and then calls
//! [`TimerSet::take_due`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Heartbeat,
    IdleCheck,
    Poll,
    /// One-shot: auto-resolves an unanswered inactivity prompt.
    InactivityGrace,
}

impl TimerKind {
    fn period_ms(self, config: &TimingConfig) -> Option<u64> {
        match self {
            Self::Heartbeat => Some(config.heartbeat_interval_ms),
            Self::IdleCheck => Some(config.idle_check_interval_ms),
            Self::Poll => Some(config.poll_interval_ms),
            Self::InactivityGrace => None,
        }
    }
}

/// Which timers a phase needs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerPlan {
    pub heartbeat: bool,
    pub idle_check: bool,
    pub poll: bool,
    /// Absolute deadline of the inactivity grace window, if any.
    pub grace_deadline_ms: Option<u64>,
}

impl TimerPlan {
    pub const NONE: Self = Self {
        heartbeat: false,
        idle_check: false,
        poll: false,
        grace_deadline_ms: None,
    };
}

#[derive(Debug, Clone, Default)]
pub struct TimerSet {
    deadlines: BTreeMap<TimerKind, u64>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timers `plan` requires and disarm the rest. Periodic timers
    /// that are already armed keep their deadline, so a phase change does
    /// not postpone a pending heartbeat or poll.
    pub fn sync(&mut self, plan: &TimerPlan, now_ms: u64, config: &TimingConfig) {
        let wanted = [
            (TimerKind::Heartbeat, plan.heartbeat),
            (TimerKind::IdleCheck, plan.idle_check),
            (TimerKind::Poll, plan.poll),
        ];
        for (kind, on) in wanted {
            if on {
                if let Some(period) = kind.period_ms(config) {
                    self.deadlines
                        .entry(kind)
                        .or_insert_with(|| now_ms.saturating_add(period));
                }
            } else {
                self.deadlines.remove(&kind);
            }
        }
        match plan.grace_deadline_ms {
            Some(deadline) => {
                self.deadlines.insert(TimerKind::InactivityGrace, deadline);
            }
            None => {
                self.deadlines.remove(&TimerKind::InactivityGrace);
            }
        }
    }

    /// Restart a periodic timer from `now_ms` (e.g. after a forced poll).
    pub fn restart(&mut self, kind: TimerKind, now_ms: u64, config: &TimingConfig) {
        if let (Some(deadline), Some(period)) =
            (self.deadlines.get_mut(&kind), kind.period_ms(config))
        {
            *deadline = now_ms.saturating_add(period);
        }
    }

    pub fn disarm_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().copied().min()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.deadlines.get(&kind).copied()
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn armed(&self) -> Vec<TimerKind> {
        self.deadlines.keys().copied().collect()
    }

    /// Pop every timer due at `now_ms`. Periodic timers are re-armed one
    /// period after `now_ms`; the grace timer is removed.
    pub fn take_due(&mut self, now_ms: u64, config: &TimingConfig) -> Vec<TimerKind> {
        let due: Vec<TimerKind> = self
            .deadlines
            .iter()
            .filter(|&(_, &deadline)| deadline <= now_ms)
            .map(|(&kind, _)| kind)
            .collect();
        for kind in &due {
            match kind.period_ms(config) {
                Some(period) => {
                    self.deadlines.insert(*kind, now_ms.saturating_add(period));
                }
                None => {
                    self.deadlines.remove(kind);
                }
            }
        }
        due
    }
}
