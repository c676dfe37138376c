//! Reminder scheduling: fire-time computation, persistence, and enqueue.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::cache::ReadThroughCache;
use crate::models::job::DeliveryJob;
use crate::models::reminder::{Reminder, ReminderRequest};
use crate::models::task::Task;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::queue::NotificationQueue;
use crate::{AppError, Result};

/// Absolute fire time for a reminder.
///
/// The offset is subtracted from the instant, never from a zoned wall-clock
/// projection, so DST transitions cannot shift it.
///
/// # Errors
///
/// Returns `AppError::InvalidOffset` if the fire time falls before the
/// earliest representable instant.
pub fn compute_scheduled_at(
    origin: DateTime<Utc>,
    offset_minutes: u32,
) -> Result<DateTime<Utc>> {
    origin
        .checked_sub_signed(TimeDelta::minutes(i64::from(offset_minutes)))
        .ok_or_else(|| {
            AppError::InvalidOffset(format!(
                "{offset_minutes} minutes before {origin} is out of range"
            ))
        })
}

/// Build unsaved reminders for `task` from caller requests.
///
/// A fire time already in the past is accepted; the reminder is simply due
/// on the next worker poll.
///
/// # Errors
///
/// Returns `AppError::InvalidOffset` if any request has an out-of-range
/// offset. Nothing is built in that case.
pub fn build_reminders(task: &Task, requests: &[ReminderRequest]) -> Result<Vec<Reminder>> {
    requests
        .iter()
        .map(|request| {
            let offset = request.offset()?;
            Ok(Reminder::new(
                task.id.clone(),
                offset,
                request.notify_type,
                compute_scheduled_at(task.origin_datetime, offset)?,
            ))
        })
        .collect()
}

/// Persists reminders and pushes one delivery job per reminder.
#[derive(Clone)]
pub struct ReminderScheduler {
    reminders: ReminderRepo,
    queue: Arc<dyn NotificationQueue>,
    cache: ReadThroughCache,
}

impl ReminderScheduler {
    /// Create a scheduler over the reminder store, the queue, and the
    /// owner listing cache it must invalidate after writes.
    #[must_use]
    pub fn new(
        reminders: ReminderRepo,
        queue: Arc<dyn NotificationQueue>,
        cache: ReadThroughCache,
    ) -> Self {
        Self {
            reminders,
            queue,
            cache,
        }
    }

    /// Add reminders to an existing task owned by `owner_id`.
    ///
    /// All reminders are persisted in one batch and the owner's cached
    /// listing is invalidated before any job is pushed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidOffset` for a bad request,
    /// `AppError::NotFound` if the task is not owned by `owner_id`, and
    /// `AppError::Store` if persistence fails. Enqueue failures are not
    /// errors; see [`enqueue`](Self::enqueue).
    pub async fn schedule(
        &self,
        owner_id: &str,
        task: &Task,
        requests: &[ReminderRequest],
    ) -> Result<Vec<Reminder>> {
        let built = build_reminders(task, requests)?;
        let created = self
            .reminders
            .create_batch(owner_id, &task.id, &built)
            .await?;
        self.cache.invalidate(owner_id).await;
        self.enqueue(&created).await;
        Ok(created)
    }

    /// Push one job per reminder. Returns how many were enqueued.
    ///
    /// A failed push is logged and skipped: the reminder is already
    /// persisted and the reconciliation sweep re-enqueues it once due.
    pub async fn enqueue(&self, reminders: &[Reminder]) -> usize {
        let mut enqueued = 0;
        for reminder in reminders {
            let job = DeliveryJob::for_reminder(reminder);
            match self.queue.push(&job).await {
                Ok(()) => enqueued += 1,
                Err(err) => {
                    warn!(
                        reminder_id = %reminder.id,
                        %err,
                        "enqueue failed, leaving reminder for reconciliation"
                    );
                }
            }
        }
        if enqueued > 0 {
            info!(enqueued, total = reminders.len(), "delivery jobs enqueued");
        }
        enqueued
    }
}
