//! Database schema migrations for pomoloop.
//!
//! Migrations are versioned and applied automatically when opening the store.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 1;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// Runs inside one immediate transaction so two processes opening a fresh
/// database at the same time cannot both apply the same migration.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
    let result: SqliteResult<()> = (|| {
        create_schema_version_table(conn)?;
        let current_version = get_schema_version(conn)?;

        if current_version < 1 {
            migrate_v1(conn)?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => conn.execute_batch("COMMIT;"),
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(err)
        }
    }
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?;
    Ok(version.flatten().unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: intervals, the append-only event log, and the partial
/// unique index that allows at most one active interval.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS intervals (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            duration_sec   INTEGER NOT NULL,
            status         TEXT NOT NULL
                CHECK(status IN ('running','paused','finished','completed','abandoned','cancelled','interrupted')),
            started_at     INTEGER NOT NULL,
            ended_at       INTEGER,
            worked_sec     INTEGER NOT NULL DEFAULT 0,
            run_started_at INTEGER,
            heartbeat_at   INTEGER
        ) STRICT;

        CREATE TABLE IF NOT EXISTS interval_events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            interval_id INTEGER NOT NULL REFERENCES intervals(id),
            event_type  TEXT NOT NULL
                CHECK(event_type IN ('started','paused','resumed','finished','completed','abandoned','cancelled','interrupted')),
            event_at    INTEGER NOT NULL
        ) STRICT;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_one_active
            ON intervals((1)) WHERE status IN ('running','paused','finished','interrupted');
        CREATE INDEX IF NOT EXISTS idx_events_interval_at
            ON interval_events(interval_id, event_at);
        CREATE INDEX IF NOT EXISTS idx_intervals_started_desc
            ON intervals(started_at DESC);",
    )?;
    set_schema_version(conn, 1)
}
