//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `IF NOT EXISTS` and are safe to re-run on every
//! startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table, index and trigger definitions.
///
/// # Errors
///
/// Returns `AppError::Store` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS task (
    id              TEXT PRIMARY KEY NOT NULL,
    owner_id        TEXT NOT NULL,
    title           TEXT NOT NULL,
    description     TEXT,
    priority        TEXT NOT NULL CHECK(priority IN ('low','medium','high','critical')),
    tags            TEXT NOT NULL DEFAULT '[]',
    recurrence_rule TEXT,
    origin_datetime TEXT NOT NULL,
    origin_timezone TEXT NOT NULL,
    local_datetime  TEXT NOT NULL,
    local_timezone  TEXT NOT NULL,
    version         INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reminder (
    id                    TEXT PRIMARY KEY NOT NULL,
    task_id               TEXT NOT NULL REFERENCES task(id) ON DELETE CASCADE,
    notify_offset_minutes INTEGER NOT NULL CHECK(notify_offset_minutes >= 0),
    notify_type           TEXT NOT NULL CHECK(notify_type IN ('email','sms','push')),
    scheduled_at          TEXT NOT NULL,
    sent                  INTEGER NOT NULL DEFAULT 0,
    sent_at               TEXT,
    claimed_until         TEXT,
    created_at            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS delivery_queue (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id          TEXT NOT NULL UNIQUE,
    reminder_id     TEXT NOT NULL,
    payload         TEXT NOT NULL,
    enqueued_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_owner ON task(owner_id);
CREATE INDEX IF NOT EXISTS idx_reminder_task ON reminder(task_id);
CREATE INDEX IF NOT EXISTS idx_reminder_due ON reminder(sent, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_queue_reminder ON delivery_queue(reminder_id);

CREATE TRIGGER IF NOT EXISTS reminder_sent_monotonic
BEFORE UPDATE OF sent ON reminder
WHEN OLD.sent = 1 AND NEW.sent = 0
BEGIN
    SELECT RAISE(ABORT, 'reminder sent flag cannot be cleared');
END;
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
