//! Queue backed by the `delivery_queue` table.
//!
//! `seq` is an autoincrement key, so reading in `seq` order is FIFO by
//! push order. Each record stores the JSON-serialized job snapshot.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use super::NotificationQueue;
use crate::models::job::DeliveryJob;
use crate::persistence::db::Database;
use crate::persistence::encode_ts;
use crate::{AppError, Result};

/// Durable queue sharing the task store's `SQLite` database.
#[derive(Clone)]
pub struct SqliteQueue {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    job_id: String,
    payload: String,
}

fn queue_err(err: sqlx::Error) -> AppError {
    AppError::Queue(err.to_string())
}

impl SqliteQueue {
    /// Create a queue over an existing pool. The schema must already exist.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Number of jobs currently queued.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the count query fails.
    pub async fn depth(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM delivery_queue")
            .fetch_one(self.db.as_ref())
            .await
            .map_err(queue_err)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn push_job(&self, job: &DeliveryJob) -> Result<()> {
        let payload = serde_json::to_string(job)
            .map_err(|err| AppError::Queue(format!("cannot encode job: {err}")))?;
        sqlx::query(
            "INSERT INTO delivery_queue (job_id, reminder_id, payload, enqueued_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&job.job_id)
        .bind(&job.reminder_id)
        .bind(&payload)
        .bind(encode_ts(job.enqueued_at))
        .execute(self.db.as_ref())
        .await
        .map_err(queue_err)?;
        Ok(())
    }

    async fn peek(&self, max: u32) -> Result<Vec<DeliveryJob>> {
        let rows: Vec<QueueRow> =
            sqlx::query_as("SELECT job_id, payload FROM delivery_queue ORDER BY seq ASC LIMIT ?1")
                .bind(i64::from(max))
                .fetch_all(self.db.as_ref())
                .await
                .map_err(queue_err)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<DeliveryJob>(&row.payload) {
                Ok(job) => jobs.push(job),
                Err(err) => {
                    warn!(job_id = %row.job_id, %err, "dropping undecodable queue record");
                    self.remove_by_id(&row.job_id).await?;
                }
            }
        }
        Ok(jobs)
    }

    async fn remove_by_id(&self, job_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM delivery_queue WHERE job_id = ?1")
            .bind(job_id)
            .execute(self.db.as_ref())
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    async fn reminder_ids(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT reminder_id FROM delivery_queue")
            .fetch_all(self.db.as_ref())
            .await
            .map_err(queue_err)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

impl NotificationQueue for SqliteQueue {
    fn push<'a>(
        &'a self,
        job: &'a DeliveryJob,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.push_job(job))
    }

    fn peek_batch(
        &self,
        max: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeliveryJob>>> + Send + '_>> {
        Box::pin(self.peek(max))
    }

    fn remove<'a>(
        &'a self,
        job: &'a DeliveryJob,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.remove_by_id(&job.job_id))
    }

    fn queued_reminder_ids(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<HashSet<String>>> + Send + '_>> {
        Box::pin(self.reminder_ids())
    }
}
