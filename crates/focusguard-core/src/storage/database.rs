//! SQLite-backed persistence gateway.
//!
//! Provides local durable storage for:
//! - Completed focus sessions with their reward deltas
//! - Player totals (single row)
//!
//! Failed and cancelled sessions never reach this layer.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError, Result};
use crate::integrations::{PersistRequest, PersistenceGateway, RewardDeltas};
use crate::session::{ActionKind, PlayerTotals};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSessionRecord {
    pub session_id: String,
    pub action: ActionKind,
    pub elapsed_minutes: u64,
    pub disturbed_secs: u64,
    pub deltas: RewardDeltas,
    /// When the session ended.
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub completed_sessions: u64,
    pub focused_minutes: u64,
    pub disturbed_secs: u64,
}

/// SQLite database for completed sessions and totals.
///
/// Clones share one connection. Calls are synchronous; the async
/// [`PersistenceGateway`] impl moves them onto tokio's blocking pool.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database at `~/.config/focusguard/focusguard.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("focusguard.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if migration fails.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a completed session and overwrite the stored totals in one transaction.
    ///
    /// # Errors
    /// Returns [`DatabaseError::Duplicate`] if the session id was already
    /// recorded, or a query error.
    pub fn record_completion(&self, request: &PersistRequest) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM completed_sessions WHERE session_id = ?1",
                params![request.session_id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(DatabaseError::Duplicate(request.session_id.to_string()));
        }

        tx.execute(
            "INSERT INTO completed_sessions
                (session_id, action, elapsed_minutes, disturbed_secs, outcome,
                 xp_delta, coins_delta, sparks_delta, leveled_up, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                request.session_id.as_str(),
                request.action.as_str(),
                request.elapsed_minutes,
                request.disturbed_secs,
                request.outcome.as_str(),
                request.deltas.xp_delta,
                request.deltas.coins_delta,
                request.deltas.sparks_delta,
                request.deltas.leveled_up,
                request.ended_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE player_totals SET xp = ?1, coins = ?2, sparks = ?3, level = ?4 WHERE id = 1",
            params![
                request.totals.xp,
                request.totals.coins,
                request.totals.sparks,
                request.totals.level,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_totals(&self) -> Result<PlayerTotals, DatabaseError> {
        let totals = self.conn().query_row(
            "SELECT xp, coins, sparks, level FROM player_totals WHERE id = 1",
            [],
            |row| {
                Ok(PlayerTotals {
                    xp: row.get(0)?,
                    coins: row.get(1)?,
                    sparks: row.get(2)?,
                    level: row.get(3)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Most recent completions first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<CompletedSessionRecord>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT session_id, action, elapsed_minutes, disturbed_secs,
                    xp_delta, coins_delta, sparks_delta, leveled_up, recorded_at
             FROM completed_sessions
             ORDER BY recorded_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let action: String = row.get(1)?;
            let recorded_at: String = row.get(8)?;
            Ok(CompletedSessionRecord {
                session_id: row.get(0)?,
                action: ActionKind::parse(&action).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        format!("unknown action '{action}'").into(),
                    )
                })?,
                elapsed_minutes: row.get(2)?,
                disturbed_secs: row.get(3)?,
                deltas: RewardDeltas {
                    xp_delta: row.get(4)?,
                    coins_delta: row.get(5)?,
                    sparks_delta: row.get(6)?,
                    leveled_up: row.get(7)?,
                    new_level: 0,
                },
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            8,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn stats(&self) -> Result<Stats, DatabaseError> {
        let stats = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(elapsed_minutes), 0), COALESCE(SUM(disturbed_secs), 0)
             FROM completed_sessions",
            [],
            |row| {
                Ok(Stats {
                    completed_sessions: row.get(0)?,
                    focused_minutes: row.get(1)?,
                    disturbed_secs: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }
}

#[async_trait]
impl PersistenceGateway for Database {
    async fn persist(&self, request: &PersistRequest) -> Result<()> {
        let db = self.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || db.record_completion(&request))
            .await
            .map_err(|err| CoreError::Collaborator {
                service: "sqlite".into(),
                message: "blocking persist task did not finish".into(),
                source: Some(Box::new(err)),
            })?
            .map_err(CoreError::from)
    }
}
