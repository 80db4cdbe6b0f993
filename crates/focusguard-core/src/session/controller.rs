//! Session lifecycle controller.
//!
//! The single owner of "is a session active". Like the timer pieces it wraps,
//! it has no threads or timers: the caller delivers visibility signals and
//! drives the two periodic tasks with [`SessionController::tick_shield`] and
//! [`SessionController::tick_clock`], in any order.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Active -> Terminating -> Idle
//! ```
//!
//! Terminating never outlives the call that entered it: the monitor and clock
//! are released, a [`SessionSummary`] is produced and the slot is empty again
//! before the call returns. Reward resolution and persistence happen
//! afterwards and cannot hold up the return to Idle.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::{
    ActionKind, EndCause, Outcome, PlayerTotals, Session, SessionSnapshot, SessionSummary,
};
use crate::error::{CoreError, Result, UsageError};
use crate::events::Event;
use crate::integrations::{
    NotificationSink, PersistRequest, RewardDeltas, SessionIdIssuer, TracingSink, UuidIssuer,
};
use crate::shield::{ShieldConfig, ShieldEvent, SoftShieldMonitor, Visibility};
use crate::storage::{Config, SessionConfig};
use crate::timer::{ms_to_datetime, Clock, SessionClock};

pub struct SessionController<C: Clock> {
    clock: C,
    shield_config: ShieldConfig,
    session_config: SessionConfig,
    monitor: SoftShieldMonitor,
    countdown: Option<SessionClock>,
    slot: Option<Session>,
    totals: PlayerTotals,
    sink: Arc<dyn NotificationSink>,
    issuer: Arc<dyn SessionIdIssuer>,
}

impl<C: Clock> SessionController<C> {
    pub fn new(clock: C, config: &Config) -> Self {
        Self {
            clock,
            shield_config: config.shield.clone(),
            session_config: config.session.clone(),
            monitor: SoftShieldMonitor::new(),
            countdown: None,
            slot: None,
            totals: PlayerTotals::default(),
            sink: Arc::new(TracingSink),
            issuer: Arc::new(UuidIssuer),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_issuer(mut self, issuer: Arc<dyn SessionIdIssuer>) -> Self {
        self.issuer = issuer;
        self
    }

    /// Seed totals, typically from [`crate::Database::load_totals`].
    pub fn with_totals(mut self, totals: PlayerTotals) -> Self {
        self.totals = totals;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.slot.as_ref()
    }

    pub fn totals(&self) -> PlayerTotals {
        self.totals
    }

    pub fn monitor(&self) -> &SoftShieldMonitor {
        &self.monitor
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn shield_config(&self) -> &ShieldConfig {
        &self.shield_config
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// When the delayed grace-expiry fail is due, if one is scheduled.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.monitor.next_deadline_ms()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let session = self.slot.as_ref()?;
        let now = self.clock.now_ms();
        let remaining_secs = self
            .countdown
            .as_ref()
            .map(|c| c.remaining_secs(now))
            .unwrap_or(0);
        Some(SessionSnapshot {
            session_id: session.id.clone(),
            action: session.action,
            duration_min: session.duration_min,
            started_at: ms_to_datetime(session.started_at_ms),
            remaining_secs,
            disturbed_secs: session.disturbed_secs,
            away: self.monitor.is_disturbed(),
            warning_remaining_secs: self.monitor.pending_warning_secs(),
        })
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a session.
    ///
    /// # Errors
    /// [`UsageError::SessionAlreadyActive`] if a session is running (it is
    /// left untouched) or [`UsageError::DurationNotAllowed`].
    pub fn start(&mut self, action: ActionKind, duration_min: u32) -> Result<SessionSnapshot> {
        if let Some(active) = &self.slot {
            return Err(UsageError::SessionAlreadyActive {
                session_id: active.id.to_string(),
            }
            .into());
        }
        if !self.session_config.is_allowed(duration_min) {
            return Err(UsageError::DurationNotAllowed {
                minutes: duration_min,
                allowed: self.session_config.allowed_durations_min.clone(),
            }
            .into());
        }

        let now = self.clock.now_ms();
        let id = self.issuer.issue();
        self.monitor.arm(self.shield_config.clone());
        self.countdown = Some(SessionClock::start(now, duration_min));
        let session = self
            .slot
            .insert(Session::new(id, action, duration_min, now));

        info!(
            session_id = %session.id,
            action = action.as_str(),
            duration_min,
            "focus session started"
        );
        self.sink.notify(&Event::SessionStarted {
            session_id: session.id.clone(),
            action,
            duration_min,
            at: ms_to_datetime(now),
        });

        self.snapshot()
            .ok_or_else(|| CoreError::Sequencing("session vanished during start".into()))
    }

    /// Manual stop. Always Cancelled; a no-op when Idle.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        if !self.is_active() {
            debug!("stop requested while idle");
            return None;
        }
        self.terminate(Outcome::Cancelled, EndCause::ManualStop)
    }

    /// Deliver a foreground transition. Ignored while Idle.
    ///
    /// # Errors
    /// Propagates sequencing violations from event handling.
    pub fn on_visibility(&mut self, visibility: Visibility) -> Result<()> {
        if !self.is_active() {
            debug!(?visibility, "visibility change while idle");
            return Ok(());
        }
        let now = self.clock.now_ms();
        if let Some(event) = self.monitor.on_visibility(visibility, now)? {
            self.handle_shield_event(event)?;
        }
        Ok(())
    }

    /// Monitor tick. A no-op while Idle.
    ///
    /// # Errors
    /// Propagates sequencing violations from event handling.
    pub fn tick_shield(&mut self) -> Result<Option<SessionSummary>> {
        if !self.is_active() {
            return Ok(None);
        }
        let now = self.clock.now_ms();
        for event in self.monitor.tick(now)? {
            if let Some(summary) = self.handle_shield_event(event)? {
                return Ok(Some(summary));
            }
        }
        Ok(None)
    }

    /// Clock tick. Resolves the session when the countdown reaches zero:
    /// Completed if the user is present at that instant, Failed otherwise.
    pub fn tick_clock(&mut self) -> Option<SessionSummary> {
        let now = self.clock.now_ms();
        let tick = self.countdown.as_mut()?.tick(now).ok()?;
        if !tick.expired {
            return None;
        }
        if self.monitor.is_disturbed() {
            self.terminate(Outcome::Failed, EndCause::AwayAtCountdownEnd)
        } else {
            self.terminate(Outcome::Completed, EndCause::Countdown)
        }
    }

    /// Apply one monitor event.
    ///
    /// # Errors
    /// [`CoreError::Sequencing`] if no session is active; such an event means
    /// the monitor outlived its session.
    pub fn handle_shield_event(&mut self, event: ShieldEvent) -> Result<Option<SessionSummary>> {
        let Some(session) = self.slot.as_mut() else {
            error!(?event, "shield event delivered while idle");
            return Err(CoreError::Sequencing(format!(
                "shield event {event:?} delivered with no active session"
            )));
        };
        let now = self.clock.now_ms();

        match event {
            ShieldEvent::Disturbance { away_ms, .. } => {
                let disturbed_secs = session.record_disturbance(away_ms);
                info!(session_id = %session.id, away_ms, disturbed_secs, "disturbance recorded");
                self.sink.notify(&Event::DisturbanceRecorded {
                    session_id: session.id.clone(),
                    away_ms,
                    disturbed_secs,
                    at: ms_to_datetime(now),
                });
                Ok(None)
            }
            ShieldEvent::Warning { remaining_secs } => {
                self.sink.notify(&Event::ShieldWarning {
                    session_id: session.id.clone(),
                    remaining_secs,
                    at: ms_to_datetime(now),
                });
                Ok(None)
            }
            ShieldEvent::Fail { reason, away_ms } => {
                info!(session_id = %session.id, ?reason, away_ms, "shield failed session");
                Ok(self.terminate(Outcome::Failed, reason.into()))
            }
        }
    }

    /// Apply resolved reward deltas to the local totals and build the
    /// persistence request. The local totals stand even if persisting fails.
    pub fn apply_reward(&mut self, summary: &SessionSummary, deltas: RewardDeltas) -> PersistRequest {
        self.totals.apply(&deltas);
        info!(
            session_id = %summary.session_id,
            xp_delta = deltas.xp_delta,
            coins_delta = deltas.coins_delta,
            sparks_delta = deltas.sparks_delta,
            leveled_up = deltas.leveled_up,
            "reward applied"
        );
        self.sink.notify(&Event::RewardResolved {
            session_id: summary.session_id.clone(),
            deltas,
            totals: self.totals,
            at: self.clock.now(),
        });
        PersistRequest {
            session_id: summary.session_id.clone(),
            action: summary.action,
            elapsed_minutes: summary.elapsed_minutes,
            disturbed_secs: summary.disturbed_secs,
            outcome: summary.outcome,
            ended_at: summary.ended_at,
            deltas,
            totals: self.totals,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Release timers, resolve the summary and empty the slot. Returns `None`
    /// if the session already terminated, so a second fail is a no-op.
    fn terminate(&mut self, outcome: Outcome, cause: EndCause) -> Option<SessionSummary> {
        let mut session = self.slot.take()?;
        self.monitor.disarm();
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.stop();
        }
        self.countdown = None;

        let now = self.clock.now_ms();
        session.outcome = Some(outcome);
        let summary = SessionSummary {
            elapsed_minutes: session.elapsed_minutes(now),
            session_id: session.id,
            action: session.action,
            duration_min: session.duration_min,
            started_at: ms_to_datetime(session.started_at_ms),
            ended_at: ms_to_datetime(now),
            disturbed_secs: session.disturbed_secs,
            outcome,
            cause,
        };

        info!(
            session_id = %summary.session_id,
            outcome = outcome.as_str(),
            ?cause,
            elapsed_minutes = summary.elapsed_minutes,
            disturbed_secs = summary.disturbed_secs,
            "focus session ended"
        );

        let at = ms_to_datetime(now);
        let event = match outcome {
            Outcome::Completed => Event::SessionCompleted {
                summary: summary.clone(),
                at,
            },
            Outcome::Failed => Event::SessionFailed {
                summary: summary.clone(),
                at,
            },
            Outcome::Cancelled => Event::SessionCancelled {
                summary: summary.clone(),
                at,
            },
        };
        self.sink.notify(&event);
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::BroadcastSink;
    use crate::session::SessionId;
    use crate::shield::FailReason;
    use crate::timer::ManualClock;

    const T0: u64 = 1_700_000_000_000;

    struct FixedIssuer;

    impl SessionIdIssuer for FixedIssuer {
        fn issue(&self) -> SessionId {
            SessionId::new("fixed")
        }
    }

    fn controller() -> (SessionController<ManualClock>, ManualClock) {
        let clock = ManualClock::new(T0);
        let controller = SessionController::new(clock.clone(), &Config::default())
            .with_issuer(Arc::new(FixedIssuer));
        (controller, clock)
    }

    #[test]
    fn start_arms_monitor_and_clock() {
        let (mut c, _) = controller();
        let snapshot = c.start(ActionKind::Work, 25).unwrap();
        assert!(c.is_active());
        assert!(c.monitor().is_armed());
        assert_eq!(snapshot.remaining_secs, 1500);
        assert_eq!(snapshot.session_id, SessionId::new("fixed"));
    }

    #[test]
    fn start_rejects_disallowed_duration() {
        let (mut c, _) = controller();
        let err = c.start(ActionKind::Work, 7).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Usage(UsageError::DurationNotAllowed { minutes: 7, .. })
        ));
        assert!(!c.is_active());
        assert!(!c.monitor().is_armed());
    }

    #[test]
    fn second_start_is_rejected_without_mutation() {
        let (mut c, clock) = controller();
        c.start(ActionKind::Study, 25).unwrap();
        clock.advance_secs(90);
        let before = c.session().cloned().unwrap();

        let err = c.start(ActionKind::Read, 45).unwrap_err();
        assert!(err.is_usage());
        let after = c.session().unwrap();
        assert_eq!(after.started_at_ms, before.started_at_ms);
        assert_eq!(after.action, ActionKind::Study);
        assert_eq!(c.snapshot().unwrap().remaining_secs, 1500 - 90);
    }

    #[test]
    fn stop_is_cancelled_and_idempotent() {
        let (mut c, clock) = controller();
        c.start(ActionKind::Work, 25).unwrap();
        c.on_visibility(Visibility::Hidden).unwrap();
        clock.advance_secs(4);
        c.on_visibility(Visibility::Visible).unwrap();

        let summary = c.stop().unwrap();
        assert_eq!(summary.outcome, Outcome::Cancelled);
        assert_eq!(summary.cause, EndCause::ManualStop);
        assert_eq!(summary.disturbed_secs, 4);
        assert!(summary.reward_request().is_none());
        assert!(c.stop().is_none());
        assert!(!c.monitor().is_armed());
    }

    #[test]
    fn visibility_while_idle_is_ignored() {
        let (mut c, _) = controller();
        c.on_visibility(Visibility::Hidden).unwrap();
        c.on_visibility(Visibility::Visible).unwrap();
        assert!(!c.is_active());
    }

    #[test]
    fn fail_event_while_idle_is_a_sequencing_violation() {
        let (mut c, _) = controller();
        let err = c
            .handle_shield_event(ShieldEvent::Fail {
                reason: FailReason::AwayCeiling,
                away_ms: 15_000,
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Sequencing(_)));
    }

    #[test]
    fn countdown_end_while_away_fails() {
        let (mut c, clock) = controller();
        c.start(ActionKind::Work, 15).unwrap();
        clock.advance_secs(15 * 60 - 5);
        c.on_visibility(Visibility::Hidden).unwrap();
        clock.advance_secs(5);
        assert!(c.tick_shield().unwrap().is_none());

        let summary = c.tick_clock().unwrap();
        assert_eq!(summary.outcome, Outcome::Failed);
        assert_eq!(summary.cause, EndCause::AwayAtCountdownEnd);
        assert!(!c.is_active());
    }

    #[test]
    fn ticks_after_termination_are_noops() {
        let (mut c, clock) = controller();
        c.start(ActionKind::Work, 15).unwrap();
        clock.advance_secs(15 * 60);
        assert!(c.tick_clock().is_some());
        assert!(c.tick_clock().is_none());
        assert!(c.tick_shield().unwrap().is_none());
        assert!(c.snapshot().is_none());
    }

    #[test]
    fn apply_reward_updates_totals_and_builds_request() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();
        let (c, clock) = controller();
        let mut c = c
            .with_sink(Arc::new(sink))
            .with_totals(PlayerTotals {
                xp: 100,
                coins: 10,
                sparks: 1,
                level: 4,
            });
        c.start(ActionKind::Create, 25).unwrap();
        clock.advance_secs(25 * 60);
        let summary = c.tick_clock().unwrap();

        let request = c.apply_reward(
            &summary,
            RewardDeltas {
                xp_delta: 50,
                coins_delta: 5,
                sparks_delta: 0,
                leveled_up: true,
                new_level: 5,
            },
        );
        assert_eq!(request.totals, c.totals());
        assert_eq!(c.totals().xp, 150);
        assert_eq!(c.totals().level, 5);
        assert_eq!(request.elapsed_minutes, 25);
        assert_eq!(request.ended_at, summary.ended_at);
        assert_eq!(request.ended_at.timestamp_millis() as u64, T0 + 25 * 60_000);

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["session_started", "session_completed", "reward_resolved"]
        );
    }

    #[test]
    fn extreme_shield_values_do_not_panic() {
        let clock = ManualClock::new(T0);
        let mut config = Config::default();
        config.shield.away_threshold_secs = u64::MAX;
        let mut c = SessionController::new(clock.clone(), &config);
        c.start(ActionKind::Study, 25).unwrap();
        c.on_visibility(Visibility::Hidden).unwrap();
        clock.advance_secs(1);
        assert!(c.tick_shield().unwrap().is_none());

        let mut config = Config::default();
        config.shield.away_threshold_secs = 60;
        config.shield.fail_delay_ms = u64::MAX;
        let mut c = SessionController::new(clock.clone(), &config);
        c.start(ActionKind::Study, 25).unwrap();
        c.on_visibility(Visibility::Hidden).unwrap();
        for _ in 0..15 {
            clock.advance_secs(1);
            assert!(c.tick_shield().unwrap().is_none());
        }
        assert!(c.is_active());
        assert_eq!(c.next_deadline_ms(), Some(u64::MAX));
    }
}
