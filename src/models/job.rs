//! Queued delivery job: a snapshot of a reminder taken at enqueue time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reminder::{NotifyType, Reminder};

/// A pending delivery in the notification queue.
///
/// The snapshot may be stale by the time a worker reads it; the worker
/// always re-reads the reminder by `reminder_id` before acting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeliveryJob {
    /// Unique job identifier.
    pub job_id: String,
    /// Reminder to deliver.
    pub reminder_id: String,
    /// Task the reminder belonged to at enqueue time.
    pub task_id: String,
    /// Channel at enqueue time.
    pub notify_type: NotifyType,
    /// Fire time at enqueue time.
    pub scheduled_at: DateTime<Utc>,
    /// When the job was pushed.
    pub enqueued_at: DateTime<Utc>,
}

impl DeliveryJob {
    /// Snapshot a reminder into a new job.
    #[must_use]
    pub fn for_reminder(reminder: &Reminder) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            reminder_id: reminder.id.clone(),
            task_id: reminder.task_id.clone(),
            notify_type: reminder.notify_type,
            scheduled_at: reminder.scheduled_at,
            enqueued_at: Utc::now(),
        }
    }
}
