use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::integrations::RewardDeltas;
use crate::session::{ActionKind, PlayerTotals, SessionId, SessionSummary};

/// Every user-visible state change produces an Event.
/// Notification sinks receive them; nothing flows back into the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: SessionId,
        action: ActionKind,
        duration_min: u32,
        at: DateTime<Utc>,
    },
    /// An away episode closed and was added to the ledger.
    DisturbanceRecorded {
        session_id: SessionId,
        away_ms: u64,
        /// Ledger total after this episode.
        disturbed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Grace countdown tick. Display only.
    ShieldWarning {
        session_id: SessionId,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        summary: SessionSummary,
        at: DateTime<Utc>,
    },
    SessionFailed {
        summary: SessionSummary,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        summary: SessionSummary,
        at: DateTime<Utc>,
    },
    /// Reward deltas were applied to the local totals.
    RewardResolved {
        session_id: SessionId,
        deltas: RewardDeltas,
        totals: PlayerTotals,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Stable name for logs and filters.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SessionStarted { .. } => "session_started",
            Event::DisturbanceRecorded { .. } => "disturbance_recorded",
            Event::ShieldWarning { .. } => "shield_warning",
            Event::SessionCompleted { .. } => "session_completed",
            Event::SessionFailed { .. } => "session_failed",
            Event::SessionCancelled { .. } => "session_cancelled",
            Event::RewardResolved { .. } => "reward_resolved",
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::DisturbanceRecorded { session_id, .. }
            | Event::ShieldWarning { session_id, .. }
            | Event::RewardResolved { session_id, .. } => session_id,
            Event::SessionCompleted { summary, .. }
            | Event::SessionFailed { summary, .. }
            | Event::SessionCancelled { summary, .. } => &summary.session_id,
        }
    }
}
