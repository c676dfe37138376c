//! Task repository for `SQLite` persistence.
//!
//! Every user-facing operation is scoped by owner id. A task that exists
//! but belongs to someone else is reported as `NotFound`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDateTime;
use sqlx::SqliteConnection;

use crate::models::reminder::Reminder;
use crate::models::task::{Priority, Task};
use crate::{AppError, Result};

use super::db::Database;
use super::reminder_repo::{insert_reminder, ReminderRow, REMINDER_COLUMNS};
use super::{decode_ts, encode_ts};

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Repository wrapper around `SQLite` for task records.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    owner_id: String,
    title: String,
    description: Option<String>,
    priority: String,
    tags: String,
    recurrence_rule: Option<String>,
    origin_datetime: String,
    origin_timezone: String,
    local_datetime: String,
    local_timezone: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    /// Convert a database row into the domain model.
    fn into_task(self, reminders: Vec<Reminder>) -> Result<Task> {
        let priority = Priority::parse(&self.priority)
            .map_err(|_| AppError::Store(format!("invalid priority: {}", self.priority)))?;
        let tags: BTreeSet<String> = serde_json::from_str(&self.tags)
            .map_err(|e| AppError::Store(format!("invalid tags: {e}")))?;
        let local_datetime = NaiveDateTime::parse_from_str(&self.local_datetime, LOCAL_FORMAT)
            .map_err(|e| AppError::Store(format!("invalid local_datetime: {e}")))?;

        Ok(Task {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            priority,
            tags,
            recurrence_rule: self.recurrence_rule,
            origin_datetime: decode_ts("origin_datetime", &self.origin_datetime)?,
            origin_timezone: self.origin_timezone,
            local_datetime,
            local_timezone: self.local_timezone,
            version: self.version,
            created_at: decode_ts("created_at", &self.created_at)?,
            updated_at: decode_ts("updated_at", &self.updated_at)?,
            reminders,
        })
    }
}

fn encode_tags(tags: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string(tags).map_err(|e| AppError::Store(format!("cannot encode tags: {e}")))
}

async fn reminders_for_task(conn: &mut SqliteConnection, task_id: &str) -> Result<Vec<Reminder>> {
    let rows: Vec<ReminderRow> = sqlx::query_as(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminder r WHERE r.task_id = ?1
         ORDER BY r.scheduled_at ASC, r.id ASC"
    ))
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(ReminderRow::into_reminder).collect()
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a task together with its initial reminders in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if any insert fails; nothing is persisted.
    pub async fn create(&self, task: &Task, reminders: &[Reminder]) -> Result<Task> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO task (id, owner_id, title, description, priority, tags, recurrence_rule,
             origin_datetime, origin_timezone, local_datetime, local_timezone, version,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&task.id)
        .bind(&task.owner_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(encode_tags(&task.tags)?)
        .bind(&task.recurrence_rule)
        .bind(encode_ts(task.origin_datetime))
        .bind(&task.origin_timezone)
        .bind(task.local_datetime.format(LOCAL_FORMAT).to_string())
        .bind(&task.local_timezone)
        .bind(task.version)
        .bind(encode_ts(task.created_at))
        .bind(encode_ts(task.updated_at))
        .execute(&mut *tx)
        .await?;

        for reminder in reminders {
            insert_reminder(&mut tx, reminder).await?;
        }
        tx.commit().await?;

        let mut created = task.clone();
        created.reminders = reminders.to_vec();
        Ok(created)
    }

    /// Retrieve an owned task with its reminders.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn get(&self, id: &str, owner_id: &str) -> Result<Task> {
        let mut conn = self.db.acquire().await?;
        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM task WHERE id = ?1 AND owner_id = ?2")
                .bind(id)
                .bind(owner_id)
                .fetch_optional(&mut *conn)
                .await?;
        let row = row.ok_or_else(|| AppError::NotFound(format!("task {id} not found")))?;
        let reminders = reminders_for_task(&mut conn, id).await?;
        row.into_task(reminders)
    }

    /// Retrieve a task by id without owner scoping (worker path).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the query fails.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        let mut conn = self.db.acquire().await?;
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM task WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let reminders = reminders_for_task(&mut conn, id).await?;
        row.into_task(reminders).map(Some)
    }

    /// List all tasks of an owner, earliest due first, reminders embedded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the query fails.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<Task>> {
        // Read inside a transaction so tasks and reminders come from one snapshot.
        let mut conn = self.db.begin().await?;
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM task WHERE owner_id = ?1
             ORDER BY origin_datetime ASC, created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;

        let reminder_rows: Vec<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminder r JOIN task t ON t.id = r.task_id
             WHERE t.owner_id = ?1
             ORDER BY r.scheduled_at ASC, r.id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_task: HashMap<String, Vec<Reminder>> = HashMap::new();
        for row in reminder_rows {
            let task_id = row.task_id.clone();
            by_task.entry(task_id).or_default().push(row.into_reminder()?);
        }

        rows.into_iter()
            .map(|row| {
                let reminders = by_task.remove(&row.id).unwrap_or_default();
                row.into_task(reminders)
            })
            .collect()
    }

    /// Write updated task fields and, when given, replace the reminder set.
    ///
    /// Both happen in one transaction. The row is only written if its
    /// stored version still equals `expected_version`; the version is then
    /// incremented.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned,
    /// `AppError::Conflict` on a version mismatch, and `AppError::Store` on
    /// I/O failure. No partial update is ever committed.
    pub async fn update(
        &self,
        task: &Task,
        expected_version: i64,
        reminders: Option<&[Reminder]>,
    ) -> Result<Task> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            "UPDATE task SET title = ?1, description = ?2, priority = ?3, tags = ?4,
             recurrence_rule = ?5, origin_datetime = ?6, origin_timezone = ?7,
             local_datetime = ?8, local_timezone = ?9, updated_at = ?10,
             version = version + 1
             WHERE id = ?11 AND owner_id = ?12 AND version = ?13",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(encode_tags(&task.tags)?)
        .bind(&task.recurrence_rule)
        .bind(encode_ts(task.origin_datetime))
        .bind(&task.origin_timezone)
        .bind(task.local_datetime.format(LOCAL_FORMAT).to_string())
        .bind(&task.local_timezone)
        .bind(encode_ts(task.updated_at))
        .bind(&task.id)
        .bind(&task.owner_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM task WHERE id = ?1 AND owner_id = ?2")
                    .bind(&task.id)
                    .bind(&task.owner_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some((version,)) => AppError::Conflict(format!(
                    "task {} is at version {version}, expected {expected_version}",
                    task.id
                )),
                None => AppError::NotFound(format!("task {} not found", task.id)),
            });
        }

        if let Some(reminders) = reminders {
            sqlx::query("DELETE FROM reminder WHERE task_id = ?1")
                .bind(&task.id)
                .execute(&mut *tx)
                .await?;
            for reminder in reminders {
                insert_reminder(&mut tx, reminder).await?;
            }
        }

        let row: TaskRow = sqlx::query_as("SELECT * FROM task WHERE id = ?1")
            .bind(&task.id)
            .fetch_one(&mut *tx)
            .await?;
        let stored_reminders = reminders_for_task(&mut tx, &task.id).await?;
        tx.commit().await?;

        row.into_task(stored_reminders)
    }

    /// Delete an owned task, removing its reminders first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn delete(&self, id: &str, owner_id: &str) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM reminder WHERE task_id IN
             (SELECT id FROM task WHERE id = ?1 AND owner_id = ?2)",
        )
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let result = sqlx::query("DELETE FROM task WHERE id = ?1 AND owner_id = ?2")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("task {id} not found")));
        }
        tx.commit().await?;

        tracing::debug!(task_id = id, reminders = removed, "task deleted");
        Ok(())
    }
}
