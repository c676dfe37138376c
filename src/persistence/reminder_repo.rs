//! Reminder repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::models::reminder::{NotifyType, Reminder};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_ts, encode_ts};

/// Column list shared by every reminder query.
pub(crate) const REMINDER_COLUMNS: &str =
    "r.id, r.task_id, r.notify_offset_minutes, r.notify_type, r.scheduled_at, r.sent, r.sent_at, r.created_at";

/// Repository for reminder records.
#[derive(Clone)]
pub struct ReminderRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
pub(crate) struct ReminderRow {
    id: String,
    pub(crate) task_id: String,
    notify_offset_minutes: i64,
    notify_type: String,
    scheduled_at: String,
    sent: i64,
    sent_at: Option<String>,
    created_at: String,
}

impl ReminderRow {
    /// Convert a database row into the domain model.
    pub(crate) fn into_reminder(self) -> Result<Reminder> {
        let notify_type = NotifyType::parse(&self.notify_type)
            .map_err(|_| AppError::Store(format!("invalid notify_type: {}", self.notify_type)))?;
        let notify_offset_minutes = u32::try_from(self.notify_offset_minutes)
            .map_err(|e| AppError::Store(format!("invalid notify_offset_minutes: {e}")))?;
        let sent_at = self
            .sent_at
            .as_deref()
            .map(|s| decode_ts("sent_at", s))
            .transpose()?;

        Ok(Reminder {
            id: self.id,
            task_id: self.task_id,
            notify_offset_minutes,
            notify_type,
            scheduled_at: decode_ts("scheduled_at", &self.scheduled_at)?,
            sent: self.sent != 0,
            sent_at,
            created_at: decode_ts("created_at", &self.created_at)?,
        })
    }
}

/// Insert one reminder on an open connection or transaction.
pub(crate) async fn insert_reminder(conn: &mut SqliteConnection, reminder: &Reminder) -> Result<()> {
    sqlx::query(
        "INSERT INTO reminder (id, task_id, notify_offset_minutes, notify_type, scheduled_at,
         sent, sent_at, claimed_until, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
    )
    .bind(&reminder.id)
    .bind(&reminder.task_id)
    .bind(i64::from(reminder.notify_offset_minutes))
    .bind(reminder.notify_type.as_str())
    .bind(encode_ts(reminder.scheduled_at))
    .bind(i64::from(reminder.sent))
    .bind(reminder.sent_at.map(encode_ts))
    .bind(encode_ts(reminder.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fail with `NotFound` unless `task_id` exists and belongs to `owner_id`.
async fn ensure_task_owned(conn: &mut SqliteConnection, owner_id: &str, task_id: &str) -> Result<()> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT id FROM task WHERE id = ?1 AND owner_id = ?2")
            .bind(task_id)
            .bind(owner_id)
            .fetch_optional(&mut *conn)
            .await?;
    found
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("task {task_id} not found")))
}

impl ReminderRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a batch of reminders for an owned task in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or owned by someone
    /// else, `AppError::Store` if the insert fails (nothing is persisted).
    pub async fn create_batch(
        &self,
        owner_id: &str,
        task_id: &str,
        reminders: &[Reminder],
    ) -> Result<Vec<Reminder>> {
        if let Some(stray) = reminders.iter().find(|r| r.task_id != task_id) {
            return Err(AppError::Validation(format!(
                "reminder {} does not belong to task {task_id}",
                stray.id
            )));
        }

        let mut tx = self.db.begin().await?;
        ensure_task_owned(&mut tx, owner_id, task_id).await?;
        for reminder in reminders {
            insert_reminder(&mut tx, reminder).await?;
        }
        tx.commit().await?;

        Ok(reminders.to_vec())
    }

    /// List the reminders of an owned task, earliest fire time first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn list_for_task(&self, owner_id: &str, task_id: &str) -> Result<Vec<Reminder>> {
        let mut conn = self.db.acquire().await?;
        ensure_task_owned(&mut conn, owner_id, task_id).await?;

        let rows: Vec<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminder r WHERE r.task_id = ?1
             ORDER BY r.scheduled_at ASC, r.id ASC"
        ))
        .bind(task_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(ReminderRow::into_reminder).collect()
    }

    /// Delete every reminder of an owned task. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn delete_for_task(&self, owner_id: &str, task_id: &str) -> Result<u64> {
        let mut tx = self.db.begin().await?;
        ensure_task_owned(&mut tx, owner_id, task_id).await?;
        let result = sqlx::query("DELETE FROM reminder WHERE task_id = ?1")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Delete a single reminder whose task belongs to `owner_id`.
    ///
    /// Returns the owning task id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the reminder is missing or not owned.
    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<String> {
        let mut tx = self.db.begin().await?;
        let task_id: Option<(String,)> = sqlx::query_as(
            "SELECT r.task_id FROM reminder r JOIN task t ON t.id = r.task_id
             WHERE r.id = ?1 AND t.owner_id = ?2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (task_id,) =
            task_id.ok_or_else(|| AppError::NotFound(format!("reminder {id} not found")))?;

        sqlx::query("DELETE FROM reminder WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(task_id)
    }

    /// Fetch a reminder by id without owner scoping (worker path).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Reminder>> {
        let row: Option<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminder r WHERE r.id = ?1"
        ))
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ReminderRow::into_reminder).transpose()
    }

    /// Mark a reminder as sent and drop any dispatch claim.
    ///
    /// Returns `false` when the reminder was already sent or no longer exists.
    /// The flag is never cleared once set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the update fails.
    pub async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reminder SET sent = 1, sent_at = ?1, claimed_until = NULL
             WHERE id = ?2 AND sent = 0",
        )
        .bind(encode_ts(at))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Take exclusive dispatch rights on an unsent reminder until `until`.
    ///
    /// Succeeds only if no other claim is live at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the update fails.
    pub async fn claim(&self, id: &str, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reminder SET claimed_until = ?1
             WHERE id = ?2 AND sent = 0 AND (claimed_until IS NULL OR claimed_until <= ?3)",
        )
        .bind(encode_ts(until))
        .bind(id)
        .bind(encode_ts(now))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Drop a dispatch claim so the next cycle may retry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the update fails.
    pub async fn release_claim(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE reminder SET claimed_until = NULL WHERE id = ?1 AND sent = 0")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Unsent reminders whose fire time is at or before `now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the query fails.
    pub async fn list_unsent_due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminder r
             WHERE r.sent = 0 AND r.scheduled_at <= ?1
             ORDER BY r.scheduled_at ASC, r.id ASC"
        ))
        .bind(encode_ts(now))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ReminderRow::into_reminder).collect()
    }
}
