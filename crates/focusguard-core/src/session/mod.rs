//! Focus session data model and lifecycle controller.

mod controller;

pub use controller::SessionController;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::integrations::{RewardDeltas, RewardRequest};
use crate::shield::FailReason;

/// Opaque session identifier handed out by a [`crate::SessionIdIssuer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Activity category the user committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Study,
    Work,
    Read,
    Create,
    Meditate,
    Exercise,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Study => "study",
            ActionKind::Work => "work",
            ActionKind::Read => "read",
            ActionKind::Create => "create",
            ActionKind::Meditate => "meditate",
            ActionKind::Exercise => "exercise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "study" => Some(ActionKind::Study),
            "work" => Some(ActionKind::Work),
            "read" => Some(ActionKind::Read),
            "create" => Some(ActionKind::Create),
            "meditate" => Some(ActionKind::Meditate),
            "exercise" => Some(ActionKind::Exercise),
            _ => None,
        }
    }
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Failed,
    /// Manual stop. Never reported as a distraction failure.
    Cancelled,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// What ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCause {
    /// Countdown reached zero with the user present.
    Countdown,
    /// Countdown reached zero while an away episode was open.
    AwayAtCountdownEnd,
    AwayCeiling,
    GraceExpired,
    ManualStop,
}

impl From<FailReason> for EndCause {
    fn from(reason: FailReason) -> Self {
        match reason {
            FailReason::AwayCeiling => EndCause::AwayCeiling,
            FailReason::GraceExpired => EndCause::GraceExpired,
        }
    }
}

/// The single active session. Owned by the controller, dropped on termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub action: ActionKind,
    pub duration_min: u32,
    pub started_at_ms: u64,
    /// Cumulative away time in whole seconds. Only ever grows.
    pub disturbed_secs: u64,
    pub outcome: Option<Outcome>,
}

impl Session {
    pub fn new(id: SessionId, action: ActionKind, duration_min: u32, started_at_ms: u64) -> Self {
        Self {
            id,
            action,
            duration_min,
            started_at_ms,
            disturbed_secs: 0,
            outcome: None,
        }
    }

    /// Add one closed away episode to the ledger, rounding up to whole
    /// seconds so that any nonzero gap counts. Returns the new total.
    pub fn record_disturbance(&mut self, away_ms: u64) -> u64 {
        self.disturbed_secs = self.disturbed_secs.saturating_add(away_ms.div_ceil(1000));
        self.disturbed_secs
    }

    pub fn elapsed_minutes(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms) / 60_000
    }
}

/// Everything known about a session at the moment it terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub action: ActionKind,
    pub duration_min: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall-clock minutes, not the configured duration.
    pub elapsed_minutes: u64,
    pub disturbed_secs: u64,
    pub outcome: Outcome,
    pub cause: EndCause,
}

impl SessionSummary {
    /// Reward request for the resolver. Only completed sessions are rewarded.
    pub fn reward_request(&self) -> Option<RewardRequest> {
        (self.outcome == Outcome::Completed).then(|| RewardRequest {
            session_id: self.session_id.clone(),
            action: self.action,
            elapsed_minutes: self.elapsed_minutes,
            disturbed_secs: self.disturbed_secs,
            outcome: self.outcome,
        })
    }
}

/// Point-in-time view of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub action: ActionKind,
    pub duration_min: u32,
    pub started_at: DateTime<Utc>,
    pub remaining_secs: u64,
    pub disturbed_secs: u64,
    pub away: bool,
    pub warning_remaining_secs: Option<u64>,
}

/// Locally held progression totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTotals {
    pub xp: u64,
    pub coins: u64,
    pub sparks: u64,
    pub level: u32,
}

impl PlayerTotals {
    /// Add resolved deltas. Negative deltas floor at zero.
    pub fn apply(&mut self, deltas: &RewardDeltas) {
        self.xp = self.xp.saturating_add_signed(deltas.xp_delta);
        self.coins = self.coins.saturating_add_signed(deltas.coins_delta);
        self.sparks = self.sparks.saturating_add_signed(deltas.sparks_delta);
        if deltas.leveled_up {
            self.level = self.level.max(deltas.new_level);
        }
    }
}
