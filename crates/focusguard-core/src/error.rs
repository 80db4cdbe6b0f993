//! Core error types for focusguard-core.
//!
//! Errors fall into three families:
//!
//! - **Usage errors**: the caller asked for something the current state does
//!   not allow (starting while a session is active, touching a disarmed
//!   monitor). Rejected synchronously, nothing is mutated.
//! - **Collaborator errors**: the Reward Resolver or Persistence Gateway
//!   failed. Logged at the boundary, never retried here, never change an
//!   outcome that was already decided.
//! - **Sequencing errors**: an event arrived in a state where it cannot
//!   happen (a fail event while Idle). These point at an ordering bug and are
//!   surfaced instead of absorbed.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusguard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Caller misuse of the engine
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// Event delivered out of order
    #[error("Sequencing violation: {0}")]
    Sequencing(String),

    /// External collaborator (reward resolver, persistence gateway) failed
    #[error("Collaborator '{service}' failed: {message}")]
    Collaborator {
        service: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The runtime actor is gone
    #[error("Focus runtime is not running")]
    RuntimeClosed,
}

impl CoreError {
    /// Build a collaborator error without an underlying source.
    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Collaborator {
            service: service.into(),
            message: message.into(),
            source: None,
        }
    }

    /// True for errors the caller caused and can fix by changing the request.
    pub fn is_usage(&self) -> bool {
        matches!(self, CoreError::Usage(_))
    }
}

/// Synchronous rejections that leave every piece of state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("a focus session is already active ({session_id})")]
    SessionAlreadyActive { session_id: String },

    #[error("duration {minutes} min is not allowed (allowed: {allowed:?})")]
    DurationNotAllowed { minutes: u32, allowed: Vec<u32> },

    #[error("soft shield monitor is disarmed")]
    MonitorDisarmed,

    #[error("session clock is not running")]
    ClockNotRunning,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A completion for this session id was already recorded
    #[error("Session {0} is already recorded")]
    Duplicate(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
