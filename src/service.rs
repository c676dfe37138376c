//! Task CRUD and reminder-creation surface.
//!
//! Every write commits to the task store first, then invalidates the
//! owner's cached listing, then enqueues delivery jobs. Owner ids come from
//! the auth collaborator and are trusted as given.

use std::sync::Arc;

use tracing::info;

use crate::cache::ReadThroughCache;
use crate::models::reminder::{Reminder, ReminderRequest};
use crate::models::task::{NewTask, Task, TaskUpdate};
use crate::persistence::db::Database;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::queue::NotificationQueue;
use crate::scheduler::{build_reminders, ReminderScheduler};
use crate::Result;

/// Owner-scoped task and reminder operations.
#[derive(Clone)]
pub struct TaskService {
    tasks: TaskRepo,
    reminders: ReminderRepo,
    scheduler: ReminderScheduler,
    cache: ReadThroughCache,
}

impl TaskService {
    /// Wire the service over a database, a queue and a listing cache.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        queue: Arc<dyn NotificationQueue>,
        cache: ReadThroughCache,
    ) -> Self {
        let reminders = ReminderRepo::new(Arc::clone(&db));
        Self {
            tasks: TaskRepo::new(db),
            scheduler: ReminderScheduler::new(reminders.clone(), queue, cache.clone()),
            reminders,
            cache,
        }
    }

    /// The scheduler used for enqueueing, shared with reconciliation.
    #[must_use]
    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// Create a task and its initial reminders.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation`, `AppError::InvalidTimeZone` or
    /// `AppError::InvalidOffset` for bad input (nothing is persisted) and
    /// `AppError::Store` if the write fails.
    pub async fn create_task(&self, owner_id: &str, input: &NewTask) -> Result<Task> {
        let task = Task::from_new(owner_id, input)?;
        let reminders = build_reminders(&task, &input.reminders)?;

        let created = self.tasks.create(&task, &reminders).await?;
        self.cache.invalidate(owner_id).await;
        self.scheduler.enqueue(&created.reminders).await;

        info!(
            task_id = %created.id,
            owner_id,
            reminders = created.reminders.len(),
            "task created"
        );
        Ok(created)
    }

    /// Fetch one owned task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn get_task(&self, owner_id: &str, id: &str) -> Result<Task> {
        self.tasks.get(id, owner_id).await
    }

    /// List the owner's tasks through the read-through cache.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the cache misses and the store read fails.
    pub async fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>> {
        if let Some(hit) = self.cache.lookup(owner_id).await {
            return Ok(hit);
        }
        let generation = self.cache.generation();
        let tasks = self.tasks.list(owner_id).await?;
        self.cache.fill(owner_id, generation, tasks.clone()).await;
        Ok(tasks)
    }

    /// Update task fields and, when needed, replace the reminder set.
    ///
    /// Reminders are replaced wholesale when the update carries a reminder
    /// list, or when the origin instant changes (the existing offsets are
    /// re-submitted so every fire time is recomputed). Field and reminder
    /// changes commit together or not at all.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound`, `AppError::Conflict` on a stale
    /// `expected_version`, validation errors for bad input, and
    /// `AppError::Store` if the write fails.
    pub async fn update_task(&self, owner_id: &str, id: &str, update: &TaskUpdate) -> Result<Task> {
        let mut task = self.tasks.get(id, owner_id).await?;
        let expected_version = update.expected_version.unwrap_or(task.version);
        let origin_changed = task.apply(update)?;

        let requests: Option<Vec<ReminderRequest>> = match &update.reminders {
            Some(requests) => Some(requests.clone()),
            None if origin_changed => Some(task.reminders.iter().map(Reminder::as_request).collect()),
            None => None,
        };
        let replacement = requests
            .map(|requests| build_reminders(&task, &requests))
            .transpose()?;

        let updated = self
            .tasks
            .update(&task, expected_version, replacement.as_deref())
            .await?;
        self.cache.invalidate(owner_id).await;
        if let Some(replacement) = &replacement {
            self.scheduler.enqueue(replacement).await;
        }

        info!(
            task_id = %updated.id,
            owner_id,
            version = updated.version,
            reminders_replaced = replacement.is_some(),
            "task updated"
        );
        Ok(updated)
    }

    /// Delete a task and all of its reminders.
    ///
    /// Queued jobs for the deleted reminders stay in the queue; the worker
    /// discards them when it finds the reminder gone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn delete_task(&self, owner_id: &str, id: &str) -> Result<()> {
        self.tasks.delete(id, owner_id).await?;
        self.cache.invalidate(owner_id).await;
        info!(task_id = id, owner_id, "task deleted");
        Ok(())
    }

    /// Add reminders to an owned task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned and
    /// `AppError::InvalidOffset` for a bad request.
    pub async fn add_reminders(
        &self,
        owner_id: &str,
        task_id: &str,
        requests: &[ReminderRequest],
    ) -> Result<Vec<Reminder>> {
        let task = self.tasks.get(task_id, owner_id).await?;
        self.scheduler.schedule(owner_id, &task, requests).await
    }

    /// List the reminders of an owned task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn list_reminders(&self, owner_id: &str, task_id: &str) -> Result<Vec<Reminder>> {
        self.reminders.list_for_task(owner_id, task_id).await
    }

    /// Remove every reminder of an owned task. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is missing or not owned.
    pub async fn delete_reminders(&self, owner_id: &str, task_id: &str) -> Result<u64> {
        let removed = self.reminders.delete_for_task(owner_id, task_id).await?;
        self.cache.invalidate(owner_id).await;
        Ok(removed)
    }

    /// Remove a single reminder.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the reminder is missing or not owned.
    pub async fn delete_reminder(&self, owner_id: &str, reminder_id: &str) -> Result<()> {
        let task_id = self.reminders.delete(owner_id, reminder_id).await?;
        self.cache.invalidate(owner_id).await;
        info!(reminder_id, task_id = %task_id, "reminder deleted");
        Ok(())
    }
}
