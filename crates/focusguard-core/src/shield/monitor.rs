//! SoftShield monitor.
//!
//! Tracks how long the monitored surface has been out of the foreground and
//! turns that into three kinds of events:
//!
//! - **Disturbance**: emitted when the user comes back, carrying the length
//!   of the away episode that just closed.
//! - **Warning**: once an episode crosses `warning_threshold_secs`, a fixed
//!   5-second grace countdown starts and is re-emitted every tick
//!   (5, 4, 3, 2, 1, 0). Coming back cancels it.
//! - **Fail**: either the grace countdown ran out (after a short delay
//!   following the final zero warning) or the episode reached
//!   `away_threshold_secs`. The two paths race when the thresholds are
//!   close; the monitor latches the first fail and stays silent afterwards.
//!
//! Like the session clock, the monitor has no timers of its own. The caller
//! feeds visibility transitions and calls [`SoftShieldMonitor::tick`] on its
//! own cadence.
//!
//! ## State Transitions
//!
//! ```text
//! Disarmed -> Armed(present) <-> Armed(away) -> Armed(warning) -> Failed
//!                 ^                                  |
//!                 +------------ visible -------------+
//! ```

use serde::{Deserialize, Serialize};

use crate::error::UsageError;

/// Grace window granted once a warning is raised. Independent of the
/// configured thresholds.
pub const GRACE_WINDOW_SECS: u64 = 5;

const GRACE_WINDOW_MS: u64 = GRACE_WINDOW_SECS * 1000;

/// Thresholds and cadence for the soft shield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Continuous away time that fails the session outright.
    #[serde(default = "default_away_threshold_secs")]
    pub away_threshold_secs: u64,
    /// Away time at which the single grace warning is raised.
    #[serde(default = "default_warning_threshold_secs")]
    pub warning_threshold_secs: u64,
    /// Delay between the final zero warning and the grace-expiry fail.
    #[serde(default = "default_fail_delay_ms")]
    pub fail_delay_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_away_threshold_secs() -> u64 {
    15
}
fn default_warning_threshold_secs() -> u64 {
    10
}
fn default_fail_delay_ms() -> u64 {
    500
}
fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            away_threshold_secs: default_away_threshold_secs(),
            warning_threshold_secs: default_warning_threshold_secs(),
            fail_delay_ms: default_fail_delay_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl ShieldConfig {
    fn away_threshold_ms(&self) -> u64 {
        self.away_threshold_secs.saturating_mul(1000)
    }

    fn warning_threshold_ms(&self) -> u64 {
        self.warning_threshold_secs.saturating_mul(1000)
    }
}

/// Foreground transition reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Hidden,
    Visible,
}

/// Why the shield gave up on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// Continuous away time reached `away_threshold_secs`.
    AwayCeiling,
    /// The grace window ran out while the user was still away.
    GraceExpired,
}

/// Events raised by the monitor. The controller matches on these exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShieldEvent {
    /// An away episode closed.
    Disturbance {
        away_ms: u64,
        started_at_ms: u64,
        ended_at_ms: u64,
    },
    /// Grace countdown update; `remaining_secs == 0` is the final one.
    Warning { remaining_secs: u64 },
    Fail { reason: FailReason, away_ms: u64 },
}

/// Per-arm bookkeeping. Reset on every [`SoftShieldMonitor::arm`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldState {
    pub armed: bool,
    /// True while an away episode is open; cleared the moment the user returns.
    pub disturbed: bool,
    pub episode_started_at_ms: Option<u64>,
    pub warning_started_at_ms: Option<u64>,
    /// Last countdown value handed out, used to avoid skipping integers.
    pub last_warning_secs: Option<u64>,
    /// Set after the zero warning; the grace-expiry fail fires at this instant.
    pub fail_due_at_ms: Option<u64>,
    pub failed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SoftShieldMonitor {
    config: ShieldConfig,
    state: ShieldState,
}

impl SoftShieldMonitor {
    /// Create a disarmed monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin monitoring with `config`. Any previous bookkeeping is discarded.
    pub fn arm(&mut self, config: ShieldConfig) {
        self.config = config;
        self.state = ShieldState {
            armed: true,
            ..ShieldState::default()
        };
    }

    /// Stop monitoring. Safe from any state; nothing fires afterwards.
    pub fn disarm(&mut self) {
        self.state = ShieldState::default();
    }

    pub fn is_armed(&self) -> bool {
        self.state.armed
    }

    pub fn is_disturbed(&self) -> bool {
        self.state.disturbed
    }

    pub fn state(&self) -> &ShieldState {
        &self.state
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Away time of the open episode, or zero.
    pub fn away_ms(&self, now_ms: u64) -> u64 {
        self.state
            .episode_started_at_ms
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0)
    }

    /// Remaining grace seconds of a pending warning, as last reported.
    pub fn pending_warning_secs(&self) -> Option<u64> {
        self.state
            .warning_started_at_ms
            .and(self.state.last_warning_secs)
    }

    /// Instant at which the delayed grace-expiry fail is due, if scheduled.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.state.fail_due_at_ms
    }

    /// The surface left the foreground. Re-entrant hides keep the first start.
    ///
    /// # Errors
    /// Returns [`UsageError::MonitorDisarmed`] when not armed.
    pub fn on_hidden(&mut self, now_ms: u64) -> Result<(), UsageError> {
        self.ensure_armed()?;
        if self.state.episode_started_at_ms.is_none() {
            self.state.episode_started_at_ms = Some(now_ms);
            self.state.disturbed = true;
        }
        Ok(())
    }

    /// The surface came back. Closes the open episode, clears the disturbed
    /// flag and cancels any pending warning, including a scheduled
    /// grace-expiry fail. A visible without a preceding hidden is a no-op.
    ///
    /// # Errors
    /// Returns [`UsageError::MonitorDisarmed`] when not armed.
    pub fn on_visible(&mut self, now_ms: u64) -> Result<Option<ShieldEvent>, UsageError> {
        self.ensure_armed()?;
        let Some(started_at_ms) = self.state.episode_started_at_ms.take() else {
            return Ok(None);
        };
        self.state.disturbed = false;
        self.clear_warning();

        let away_ms = now_ms.saturating_sub(started_at_ms);
        if away_ms == 0 {
            return Ok(None);
        }
        Ok(Some(ShieldEvent::Disturbance {
            away_ms,
            started_at_ms,
            ended_at_ms: now_ms,
        }))
    }

    /// Apply a visibility transition.
    ///
    /// # Errors
    /// Returns [`UsageError::MonitorDisarmed`] when not armed.
    pub fn on_visibility(
        &mut self,
        visibility: Visibility,
        now_ms: u64,
    ) -> Result<Option<ShieldEvent>, UsageError> {
        match visibility {
            Visibility::Hidden => self.on_hidden(now_ms).map(|()| None),
            Visibility::Visible => self.on_visible(now_ms),
        }
    }

    /// Periodic evaluation. Returns the events due at `now_ms`, in order.
    ///
    /// # Errors
    /// Returns [`UsageError::MonitorDisarmed`] when not armed.
    pub fn tick(&mut self, now_ms: u64) -> Result<Vec<ShieldEvent>, UsageError> {
        self.ensure_armed()?;
        if self.state.failed || self.state.episode_started_at_ms.is_none() {
            return Ok(Vec::new());
        }

        let away_ms = self.away_ms(now_ms);

        // The hard ceiling wins regardless of where the warning cycle is.
        if away_ms >= self.config.away_threshold_ms() {
            return Ok(vec![self.fail(FailReason::AwayCeiling, away_ms)]);
        }

        if let Some(due) = self.state.fail_due_at_ms {
            if now_ms >= due {
                return Ok(vec![self.fail(FailReason::GraceExpired, away_ms)]);
            }
            return Ok(Vec::new());
        }

        let Some(warning_started_at_ms) = self.state.warning_started_at_ms else {
            if away_ms >= self.config.warning_threshold_ms() {
                self.state.warning_started_at_ms = Some(now_ms);
                self.state.last_warning_secs = Some(GRACE_WINDOW_SECS);
                return Ok(vec![ShieldEvent::Warning {
                    remaining_secs: GRACE_WINDOW_SECS,
                }]);
            }
            return Ok(Vec::new());
        };

        let remaining_ms =
            GRACE_WINDOW_MS.saturating_sub(now_ms.saturating_sub(warning_started_at_ms));
        let current = remaining_ms.div_ceil(1000);
        let last = self.state.last_warning_secs.unwrap_or(GRACE_WINDOW_SECS);
        if current >= last {
            return Ok(Vec::new());
        }

        // A late tick still walks the countdown one integer at a time.
        let mut events: Vec<ShieldEvent> = (current..last)
            .rev()
            .filter(|secs| *secs > current)
            .map(|remaining_secs| ShieldEvent::Warning { remaining_secs })
            .collect();
        events.push(ShieldEvent::Warning {
            remaining_secs: current,
        });
        self.state.last_warning_secs = Some(current);

        if current == 0 {
            let due = now_ms.saturating_add(self.config.fail_delay_ms);
            self.state.fail_due_at_ms = Some(due);
            if self.config.fail_delay_ms == 0 {
                events.push(self.fail(FailReason::GraceExpired, away_ms));
            }
        }
        Ok(events)
    }

    fn fail(&mut self, reason: FailReason, away_ms: u64) -> ShieldEvent {
        self.state.failed = true;
        self.clear_warning();
        ShieldEvent::Fail { reason, away_ms }
    }

    fn clear_warning(&mut self) {
        self.state.warning_started_at_ms = None;
        self.state.last_warning_secs = None;
        self.state.fail_due_at_ms = None;
    }

    fn ensure_armed(&self) -> Result<(), UsageError> {
        if self.state.armed {
            Ok(())
        } else {
            Err(UsageError::MonitorDisarmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn armed(config: ShieldConfig) -> SoftShieldMonitor {
        let mut monitor = SoftShieldMonitor::new();
        monitor.arm(config);
        monitor
    }

    fn at(secs: u64) -> u64 {
        T0 + secs * 1000
    }

    fn warnings(events: &[ShieldEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                ShieldEvent::Warning { remaining_secs } => Some(*remaining_secs),
                _ => None,
            })
            .collect()
    }

    /// Tick once per second from `from` to `to` inclusive, collecting events.
    fn run(monitor: &mut SoftShieldMonitor, from: u64, to: u64) -> Vec<(u64, ShieldEvent)> {
        let mut out = Vec::new();
        for s in from..=to {
            for event in monitor.tick(at(s)).unwrap() {
                out.push((s, event));
            }
        }
        out
    }

    #[test]
    fn disarmed_monitor_rejects_everything() {
        let mut monitor = SoftShieldMonitor::new();
        assert_eq!(monitor.on_hidden(T0), Err(UsageError::MonitorDisarmed));
        assert_eq!(monitor.on_visible(T0), Err(UsageError::MonitorDisarmed));
        assert_eq!(monitor.tick(T0), Err(UsageError::MonitorDisarmed));
    }

    #[test]
    fn short_episode_reports_disturbance_without_warning() {
        let mut monitor = armed(ShieldConfig::default());
        monitor.on_hidden(at(100)).unwrap();
        assert!(monitor.is_disturbed());
        assert!(run(&mut monitor, 100, 102).is_empty());

        let event = monitor.on_visible(at(103)).unwrap();
        assert_eq!(
            event,
            Some(ShieldEvent::Disturbance {
                away_ms: 3_000,
                started_at_ms: at(100),
                ended_at_ms: at(103),
            })
        );
        assert!(!monitor.is_disturbed());
    }

    #[test]
    fn reentrant_hide_keeps_first_start() {
        let mut monitor = armed(ShieldConfig::default());
        monitor.on_hidden(at(10)).unwrap();
        monitor.on_hidden(at(12)).unwrap();
        assert_eq!(monitor.state().episode_started_at_ms, Some(at(10)));
    }

    #[test]
    fn visible_without_hidden_is_noop() {
        let mut monitor = armed(ShieldConfig::default());
        assert_eq!(monitor.on_visible(at(5)).unwrap(), None);
        assert!(!monitor.is_disturbed());
    }

    #[test]
    fn tiny_gap_still_counts() {
        let mut monitor = armed(ShieldConfig::default());
        monitor.on_hidden(T0).unwrap();
        let event = monitor.on_visible(T0 + 1).unwrap();
        assert!(matches!(event, Some(ShieldEvent::Disturbance { away_ms: 1, .. })));
    }

    #[test]
    fn warning_counts_down_without_gaps() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(50)).unwrap();
        let events = run(&mut monitor, 50, 65);
        let values = warnings(&events.iter().map(|(_, e)| e.clone()).collect::<Vec<_>>());
        assert_eq!(values, vec![5, 4, 3, 2, 1, 0]);
        assert_eq!(events.first().map(|(s, _)| *s), Some(60));
        assert_eq!(monitor.next_deadline_ms(), Some(at(65) + 500));
    }

    #[test]
    fn late_tick_fills_in_skipped_integers() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        assert_eq!(warnings(&monitor.tick(at(10)).unwrap()), vec![5]);
        // Host stalled for three seconds.
        assert_eq!(warnings(&monitor.tick(at(13)).unwrap()), vec![4, 3, 2]);
        // Same second again: nothing new to announce.
        assert!(monitor.tick(at(13) + 200).unwrap().is_empty());
    }

    #[test]
    fn partial_seconds_round_up() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        monitor.tick(at(10)).unwrap();
        assert_eq!(warnings(&monitor.tick(at(14) + 900).unwrap()), vec![4, 3, 2, 1]);
    }

    #[test]
    fn grace_expiry_fails_after_delay() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(50)).unwrap();
        run(&mut monitor, 50, 65);
        assert!(monitor.tick(at(65) + 100).unwrap().is_empty());
        assert_eq!(
            monitor.tick(at(65) + 500).unwrap(),
            vec![ShieldEvent::Fail {
                reason: FailReason::GraceExpired,
                away_ms: 15_500,
            }]
        );
        assert!(monitor.state().failed);
        assert!(monitor.tick(at(70)).unwrap().is_empty());
    }

    #[test]
    fn zero_delay_fails_on_same_tick() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            fail_delay_ms: 0,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        monitor.tick(at(10)).unwrap();
        let events = monitor.tick(at(15)).unwrap();
        assert_eq!(events.last(), Some(&ShieldEvent::Fail {
            reason: FailReason::GraceExpired,
            away_ms: 15_000,
        }));
        assert_eq!(warnings(&events), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn away_ceiling_fails_mid_warning() {
        let mut monitor = armed(ShieldConfig::default());
        monitor.on_hidden(at(200)).unwrap();
        let events = run(&mut monitor, 200, 216);
        let fails: Vec<_> = events
            .iter()
            .filter(|(_, e)| matches!(e, ShieldEvent::Fail { .. }))
            .collect();
        assert_eq!(fails.len(), 1);
        assert_eq!(
            fails[0],
            &(215, ShieldEvent::Fail {
                reason: FailReason::AwayCeiling,
                away_ms: 15_000,
            })
        );
    }

    #[test]
    fn ceiling_can_fire_without_any_warning() {
        let config = ShieldConfig {
            away_threshold_secs: 8,
            warning_threshold_secs: 10,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        let events = run(&mut monitor, 0, 9);
        assert!(warnings(&events.iter().map(|(_, e)| e.clone()).collect::<Vec<_>>()).is_empty());
        assert!(matches!(
            events[0],
            (8, ShieldEvent::Fail { reason: FailReason::AwayCeiling, .. })
        ));
    }

    #[test]
    fn returning_cancels_warning_and_pending_fail() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            fail_delay_ms: 2_000,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        run(&mut monitor, 0, 15);
        assert!(monitor.next_deadline_ms().is_some());

        monitor.on_visible(at(16)).unwrap();
        assert_eq!(monitor.next_deadline_ms(), None);
        assert_eq!(monitor.pending_warning_secs(), None);
        assert!(run(&mut monitor, 17, 30).is_empty());
    }

    #[test]
    fn warning_rearms_on_next_episode() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        run(&mut monitor, 0, 11);
        monitor.on_visible(at(12)).unwrap();

        monitor.on_hidden(at(20)).unwrap();
        let events = run(&mut monitor, 20, 30);
        assert_eq!(
            events.first().cloned(),
            Some((30, ShieldEvent::Warning { remaining_secs: 5 }))
        );
    }

    #[test]
    fn disarm_releases_everything() {
        let mut monitor = armed(ShieldConfig::default());
        monitor.on_hidden(at(0)).unwrap();
        run(&mut monitor, 0, 11);
        monitor.disarm();
        monitor.disarm();
        assert!(!monitor.is_armed());
        assert!(!monitor.is_disturbed());
        assert_eq!(monitor.tick(at(20)), Err(UsageError::MonitorDisarmed));
    }

    #[test]
    fn arm_resets_previous_state() {
        let mut monitor = armed(ShieldConfig::default());
        monitor.on_hidden(at(0)).unwrap();
        run(&mut monitor, 0, 15);
        assert!(monitor.state().failed);
        monitor.arm(ShieldConfig::default());
        assert_eq!(
            monitor.state(),
            &ShieldState {
                armed: true,
                ..ShieldState::default()
            }
        );
    }

    #[test]
    fn huge_away_threshold_never_fires() {
        let config = ShieldConfig {
            away_threshold_secs: u64::MAX,
            warning_threshold_secs: u64::MAX - 1,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        assert!(run(&mut monitor, 1, 120).is_empty());
        assert!(!monitor.state().failed);
    }

    #[test]
    fn huge_fail_delay_saturates() {
        let config = ShieldConfig {
            away_threshold_secs: 60,
            fail_delay_ms: u64::MAX,
            ..ShieldConfig::default()
        };
        let mut monitor = armed(config);
        monitor.on_hidden(at(0)).unwrap();
        let events = run(&mut monitor, 1, 15);
        assert_eq!(
            warnings(&events.iter().map(|(_, e)| e.clone()).collect::<Vec<_>>()),
            vec![5, 4, 3, 2, 1, 0]
        );
        assert_eq!(monitor.next_deadline_ms(), Some(u64::MAX));

        // The ceiling still ends the episode.
        let fail = monitor.tick(at(60)).unwrap();
        assert!(matches!(
            fail.as_slice(),
            [ShieldEvent::Fail { reason: FailReason::AwayCeiling, .. }]
        ));
    }
}
