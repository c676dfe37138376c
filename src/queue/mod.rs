//! Durable, ordered, at-least-once notification queue.
//!
//! Producers [`push`](NotificationQueue::push) one job per scheduled
//! reminder. The worker reads with [`peek_batch`](NotificationQueue::peek_batch),
//! which leaves jobs visible, and retires each with
//! [`remove`](NotificationQueue::remove) only after the reminder is
//! confirmed sent (or found stale). A crash in between means the job is
//! seen again on the next poll.

pub mod sqlite;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use crate::models::job::DeliveryJob;
use crate::Result;

pub use sqlite::SqliteQueue;

/// Storage-agnostic queue interface.
pub trait NotificationQueue: Send + Sync {
    /// Append a job at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`](crate::AppError::Queue) if the job cannot be stored.
    fn push<'a>(
        &'a self,
        job: &'a DeliveryJob,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Read up to `max` jobs from the head in push order without removing them.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`](crate::AppError::Queue) if the queue cannot be read.
    fn peek_batch(
        &self,
        max: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeliveryJob>>> + Send + '_>>;

    /// Remove a job. Removing a job that is already gone is a no-op, so
    /// concurrent workers may call this redundantly.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`](crate::AppError::Queue) if the delete fails.
    fn remove<'a>(
        &'a self,
        job: &'a DeliveryJob,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Reminder ids that currently have at least one queued job.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`](crate::AppError::Queue) if the queue cannot be read.
    fn queued_reminder_ids(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<HashSet<String>>> + Send + '_>>;
}
