//! SQLite-backed interval store.
//!
//! Every mutation is a conditional update: it names the status the row must
//! currently have, and when the `UPDATE` touches zero rows the whole
//! transaction rolls back and [`StoreError::PreconditionFailed`] is returned.
//! The state change and its audit event share one `BEGIN IMMEDIATE`
//! transaction, so neither can exist without the other.
//!
//! The store is the only synchronization point between processes. Lock
//! acquisition waits at most `busy_timeout`, then fails with
//! [`StoreError::Busy`].

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Params, Row};

use super::migrations;
use crate::error::StoreError;
use crate::interval::{
    DailyCount, EventType, Interval, IntervalEvent, IntervalStatus, Resolution,
};
use crate::time_fmt::start_of_day;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const SELECT_INTERVAL: &str = "SELECT id, status, duration_sec, worked_sec, run_started_at, \
     started_at, ended_at, heartbeat_at FROM intervals";

fn read_interval(row: &Row<'_>) -> rusqlite::Result<Interval> {
    Ok(Interval {
        id: row.get(0)?,
        status: row.get(1)?,
        duration_sec: row.get(2)?,
        worked_sec: row.get(3)?,
        run_started_at: row.get(4)?,
        started_at: row.get(5)?,
        ended_at: row.get(6)?,
        heartbeat_at: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Durable interval store.
///
/// Construct one per process and pass it by reference; the connection is
/// closed when the store is dropped.
pub struct IntervalStore {
    conn: Connection,
}

impl IntervalStore {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open (creating if needed) the store at `path`.
    ///
    /// Enables WAL mode and foreign keys, installs the busy timeout, and
    /// applies pending migrations.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init(conn)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::migrate(&conn).map_err(|e| match StoreError::from(e) {
            StoreError::Busy => StoreError::Busy,
            other => StoreError::MigrationFailed(other.to_string()),
        })?;
        Ok(Self { conn })
    }

    /// Run `f` inside an immediate (write-locking) transaction.
    fn write_tx<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        match f(&self.conn) {
            Ok(value) => {
                if let Err(err) = self.conn.execute_batch("COMMIT;") {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                    return Err(err.into());
                }
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    /// Apply `sql` to one row and append `event`, or change nothing.
    fn transition<P: Params>(
        &self,
        id: i64,
        op: &'static str,
        event: EventType,
        now: i64,
        sql: &str,
        params: P,
    ) -> Result<(), StoreError> {
        self.write_tx(|conn| {
            if conn.execute(sql, params)? == 0 {
                return Err(StoreError::PreconditionFailed { id, op });
            }
            insert_event(conn, id, event, now)
        })
    }

    // === Queries ===

    /// The most recently started interval, if any.
    pub fn latest(&self) -> Result<Option<Interval>, StoreError> {
        let sql = format!("{SELECT_INTERVAL} ORDER BY started_at DESC, id DESC LIMIT 1");
        Ok(self.conn.query_row(&sql, [], read_interval).optional()?)
    }

    pub fn get(&self, id: i64) -> Result<Option<Interval>, StoreError> {
        get_interval(&self.conn, id)
    }

    /// The interval currently holding the active slot, if any.
    pub fn active(&self) -> Result<Option<Interval>, StoreError> {
        let sql = format!(
            "{SELECT_INTERVAL} WHERE status IN ('running','paused','finished','interrupted') LIMIT 1"
        );
        Ok(self.conn.query_row(&sql, [], read_interval).optional()?)
    }

    /// Most recent intervals first.
    pub fn history(&self, limit: u32) -> Result<Vec<Interval>, StoreError> {
        let sql = format!("{SELECT_INTERVAL} ORDER BY started_at DESC, id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], read_interval)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Completed counts per local day, newest day first. Days without a
    /// completed interval are omitted.
    pub fn daily_completed(&self, limit: u32) -> Result<Vec<DailyCount>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT date(started_at, 'unixepoch', 'localtime') AS day, COUNT(*)
             FROM intervals
             WHERE status = 'completed'
             GROUP BY day
             ORDER BY day DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                completed: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Intervals started at or after `since` that ended up completed.
    pub fn count_completed_since(&self, since: i64) -> Result<u32, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM intervals WHERE started_at >= ?1 AND status = 'completed'",
            params![since],
            |row| row.get(0),
        )?)
    }

    /// Intervals completed since local midnight.
    pub fn count_today_completed(&self, now: i64) -> Result<u32, StoreError> {
        self.count_completed_since(start_of_day(now))
    }

    /// Audit log of one interval in insertion order.
    pub fn events(&self, interval_id: i64) -> Result<Vec<IntervalEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, interval_id, event_type, event_at
             FROM interval_events
             WHERE interval_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![interval_id], |row| {
            Ok(IntervalEvent {
                id: row.get(0)?,
                interval_id: row.get(1)?,
                event_type: row.get(2)?,
                event_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === Mutations ===

    /// Create a new running interval and its `started` event.
    ///
    /// The partial unique index on the active statuses rejects a second
    /// active row, which surfaces as [`StoreError::ActiveIntervalExists`].
    pub fn create(&self, duration_sec: i64, now: i64) -> Result<Interval, StoreError> {
        self.write_tx(|conn| {
            let inserted = conn.execute(
                "INSERT INTO intervals (duration_sec, status, started_at, worked_sec, run_started_at)
                 VALUES (?1, 'running', ?2, 0, ?2)",
                params![duration_sec, now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Err(StoreError::ActiveIntervalExists),
                Err(e) => return Err(e.into()),
            }
            let id = conn.last_insert_rowid();
            insert_event(conn, id, EventType::Started, now)?;
            get_interval(conn, id)?.ok_or(StoreError::PreconditionFailed { id, op: "create" })
        })
    }

    /// Mark a running interval as finished (awaiting resolution).
    ///
    /// `ended_at` records when the timer elapsed.
    pub fn finish(&self, id: i64, worked_sec: i64, now: i64) -> Result<(), StoreError> {
        self.transition(
            id,
            "finish",
            EventType::Finished,
            now,
            "UPDATE intervals
             SET status = 'finished', worked_sec = ?1, ended_at = ?2,
                 run_started_at = NULL, heartbeat_at = NULL
             WHERE id = ?3 AND status = 'running'",
            params![worked_sec, now, id],
        )
    }

    /// Resolve a finished interval as completed or abandoned.
    ///
    /// Leaves `ended_at` alone: it marks when the timer elapsed, not when the
    /// user decided.
    pub fn resolve(&self, id: i64, resolution: Resolution, now: i64) -> Result<(), StoreError> {
        self.transition(
            id,
            "resolve",
            resolution.event_type(),
            now,
            "UPDATE intervals SET status = ?1 WHERE id = ?2 AND status = 'finished'",
            params![resolution.status(), id],
        )
    }

    pub fn pause(&self, id: i64, worked_sec: i64, now: i64) -> Result<(), StoreError> {
        self.transition(
            id,
            "pause",
            EventType::Paused,
            now,
            "UPDATE intervals
             SET status = 'paused', worked_sec = ?1, run_started_at = NULL, heartbeat_at = NULL
             WHERE id = ?2 AND status = 'running'",
            params![worked_sec, id],
        )
    }

    /// Resume a paused or interrupted interval.
    pub fn resume(&self, id: i64, now: i64) -> Result<(), StoreError> {
        self.transition(
            id,
            "resume",
            EventType::Resumed,
            now,
            "UPDATE intervals
             SET status = 'running', run_started_at = ?1, heartbeat_at = NULL
             WHERE id = ?2 AND status IN ('paused', 'interrupted')",
            params![now, id],
        )
    }

    pub fn cancel(&self, id: i64, worked_sec: i64, now: i64) -> Result<(), StoreError> {
        self.transition(
            id,
            "cancel",
            EventType::Cancelled,
            now,
            "UPDATE intervals
             SET status = 'cancelled', worked_sec = ?1, ended_at = ?2,
                 run_started_at = NULL, heartbeat_at = NULL
             WHERE id = ?3 AND status IN ('running', 'paused', 'interrupted')",
            params![worked_sec, now, id],
        )
    }

    /// Record worker liveness. Advisory only: no audit event.
    pub fn update_heartbeat(&self, id: i64, now: i64) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE intervals SET heartbeat_at = ?1 WHERE id = ?2 AND status = 'running'",
            params![now, id],
        )?;
        if updated == 0 {
            return Err(StoreError::PreconditionFailed { id, op: "heartbeat" });
        }
        Ok(())
    }

    /// Crash recovery: move a running interval whose worker is gone to
    /// `interrupted`, crediting work up to the last heartbeat.
    ///
    /// Returns the credited `worked_sec`.
    pub fn recover(&self, id: i64, now: i64) -> Result<i64, StoreError> {
        self.write_tx(|conn| {
            let interval = get_interval(conn, id)?
                .filter(|iv| iv.status == IntervalStatus::Running)
                .ok_or(StoreError::PreconditionFailed { id, op: "recover" })?;
            let credited = interval.recovery_credit();
            let updated = conn.execute(
                "UPDATE intervals
                 SET status = 'interrupted', worked_sec = ?1,
                     run_started_at = NULL, heartbeat_at = NULL
                 WHERE id = ?2 AND status = 'running'",
                params![credited, id],
            )?;
            if updated == 0 {
                return Err(StoreError::PreconditionFailed { id, op: "recover" });
            }
            insert_event(conn, id, EventType::Interrupted, now)?;
            Ok(credited)
        })
    }
}

fn get_interval(conn: &Connection, id: i64) -> Result<Option<Interval>, StoreError> {
    let sql = format!("{SELECT_INTERVAL} WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], read_interval).optional()?)
}

fn insert_event(
    conn: &Connection,
    interval_id: i64,
    event_type: EventType,
    event_at: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO interval_events (interval_id, event_type, event_at) VALUES (?1, ?2, ?3)",
        params![interval_id, event_type, event_at],
    )?;
    Ok(())
}
