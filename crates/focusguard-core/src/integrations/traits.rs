//! Collaborator seams.
//!
//! The engine decides outcomes; everything it hands work to sits behind one
//! of these traits. Implementations must not feed anything back into the
//! state machine except through the return values shown here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::Event;
use crate::session::{ActionKind, Outcome, PlayerTotals, SessionId};

/// Input to the reward resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRequest {
    pub session_id: SessionId,
    pub action: ActionKind,
    pub elapsed_minutes: u64,
    pub disturbed_secs: u64,
    pub outcome: Outcome,
}

/// Currency and experience changes decided by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDeltas {
    pub xp_delta: i64,
    pub coins_delta: i64,
    pub sparks_delta: i64,
    pub leveled_up: bool,
    pub new_level: u32,
}

/// What gets durably recorded for a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistRequest {
    pub session_id: SessionId,
    pub action: ActionKind,
    pub elapsed_minutes: u64,
    pub disturbed_secs: u64,
    pub outcome: Outcome,
    /// When the session ended, on the engine's clock.
    pub ended_at: DateTime<Utc>,
    pub deltas: RewardDeltas,
    /// Totals after the deltas were applied locally.
    pub totals: PlayerTotals,
}

/// Maps a finished session to reward deltas. The formula lives elsewhere.
#[async_trait]
pub trait RewardResolver: Send + Sync {
    async fn resolve(&self, request: &RewardRequest) -> Result<RewardDeltas>;
}

/// Durably records completed sessions. Retries are the gateway's business.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn persist(&self, request: &PersistRequest) -> Result<()>;
}

/// Receives engine events for display. Pure sink.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Hands out session ids.
pub trait SessionIdIssuer: Send + Sync {
    fn issue(&self) -> SessionId;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIssuer;

impl SessionIdIssuer for UuidIssuer {
    fn issue(&self) -> SessionId {
        SessionId::new(uuid::Uuid::new_v4().to_string())
    }
}
