//! Database schema migrations for focusguard.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Current schema version, or 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: completed sessions and player totals.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS completed_sessions (
            session_id      TEXT PRIMARY KEY,
            action          TEXT NOT NULL,
            elapsed_minutes INTEGER NOT NULL,
            disturbed_secs  INTEGER NOT NULL DEFAULT 0,
            outcome         TEXT NOT NULL,
            xp_delta        INTEGER NOT NULL DEFAULT 0,
            coins_delta     INTEGER NOT NULL DEFAULT 0,
            sparks_delta    INTEGER NOT NULL DEFAULT 0,
            recorded_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS player_totals (
            id     INTEGER PRIMARY KEY CHECK (id = 1),
            xp     INTEGER NOT NULL DEFAULT 0,
            coins  INTEGER NOT NULL DEFAULT 0,
            sparks INTEGER NOT NULL DEFAULT 0,
            level  INTEGER NOT NULL DEFAULT 0
        );

        INSERT OR IGNORE INTO player_totals (id) VALUES (1);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: level-up flag and a recency index.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE completed_sessions ADD COLUMN leveled_up INTEGER NOT NULL DEFAULT 0;
         CREATE INDEX IF NOT EXISTS idx_completed_sessions_recorded_at
            ON completed_sessions(recorded_at);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}
