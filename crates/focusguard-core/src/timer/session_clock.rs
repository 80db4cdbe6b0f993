//! Wall-clock-anchored session countdown.
//!
//! The remaining time is never decremented in place. Every tick recomputes it
//! from the fixed start timestamp:
//!
//! ```text
//! remaining_secs = max(0, duration_min * 60 - floor((now - start) / 1000))
//! ```
//!
//! so a suspended host process picks up the true remaining time on its next
//! tick instead of drifting.

use serde::{Deserialize, Serialize};

use crate::error::UsageError;

/// Result of one clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTick {
    pub remaining_secs: u64,
    /// True only on the tick that first observes zero.
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClock {
    started_at_ms: u64,
    duration_min: u32,
    running: bool,
    expired: bool,
}

impl SessionClock {
    /// Arm a countdown anchored at `started_at_ms`.
    pub fn start(started_at_ms: u64, duration_min: u32) -> Self {
        Self {
            started_at_ms,
            duration_min,
            running: true,
            expired: false,
        }
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn duration_min(&self) -> u32 {
        self.duration_min
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_expired(&self) -> bool {
        self.expired
    }

    pub fn total_secs(&self) -> u64 {
        u64::from(self.duration_min) * 60
    }

    /// Whole seconds elapsed since start; a reading before start counts as zero.
    pub fn elapsed_secs(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms) / 1000
    }

    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        self.total_secs().saturating_sub(self.elapsed_secs(now_ms))
    }

    /// Recompute remaining time and report expiry exactly once.
    ///
    /// # Errors
    /// Returns [`UsageError::ClockNotRunning`] after [`SessionClock::stop`].
    pub fn tick(&mut self, now_ms: u64) -> Result<ClockTick, UsageError> {
        if !self.running {
            return Err(UsageError::ClockNotRunning);
        }
        let remaining_secs = self.remaining_secs(now_ms);
        let expired = remaining_secs == 0 && !self.expired;
        if expired {
            self.expired = true;
        }
        Ok(ClockTick {
            remaining_secs,
            expired,
        })
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
    }
}
