//! # FocusGuard Core Library
//!
//! Engine behind timed focus sessions: the user commits to an uninterrupted
//! block of time, the engine tracks elapsed time, watches for the user
//! leaving the foreground, grants a short grace period, and settles the
//! session as completed, failed or cancelled.
//!
//! ## Architecture
//!
//! - **Session Clock**: wall-clock-anchored countdown recomputed from the
//!   start timestamp on every tick
//! - **SoftShield Monitor**: turns hidden/visible transitions into
//!   disturbance, warning and fail events
//! - **Session Controller**: owns the single active-session slot and decides
//!   outcomes; no internal threads, the caller ticks it
//! - **Runtime**: tokio actor that ticks the controller and hands completed
//!   sessions to the reward resolver and persistence gateway
//! - **Storage**: TOML configuration and a SQLite persistence gateway
//!
//! ## Key Components
//!
//! - [`SessionController`]: lifecycle state machine
//! - [`SoftShieldMonitor`]: anti-distraction monitor
//! - [`SessionClock`]: countdown
//! - [`FocusRuntime`]: async driver
//! - [`RewardResolver`] / [`PersistenceGateway`] / [`NotificationSink`]: collaborator seams

pub mod error;
pub mod events;
pub mod integrations;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod shield;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, Result, UsageError};
pub use events::Event;
pub use integrations::{
    BroadcastSink, FanoutSink, NotificationSink, PersistRequest, PersistenceGateway,
    RewardDeltas, RewardRequest, RewardResolver, SessionIdIssuer, TracingSink, UuidIssuer,
};
pub use runtime::{FocusHandle, FocusRuntime};
pub use session::{
    ActionKind, EndCause, Outcome, PlayerTotals, Session, SessionController, SessionId,
    SessionSnapshot, SessionSummary,
};
pub use shield::{
    FailReason, ShieldConfig, ShieldEvent, ShieldState, SoftShieldMonitor, Visibility,
    GRACE_WINDOW_SECS,
};
pub use storage::{CompletedSessionRecord, Config, Database, SessionConfig, Stats};
pub use timer::{Clock, ClockTick, ManualClock, SessionClock, SystemClock, TokioClock};
