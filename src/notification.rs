//! Rendering of reminder messages.
//!
//! Both projections are re-derived from the task's origin instant at send
//! time. The stored `local_datetime` is advisory and never rendered.

use serde::{Deserialize, Serialize};

use crate::models::reminder::{NotifyType, Reminder};
use crate::models::task::Task;
use crate::timezone::display_in_zone;
use crate::Result;

/// Provider-neutral notification payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Notification {
    /// Reminder being delivered. Providers may use it as an idempotency key.
    pub reminder_id: String,
    /// Task the reminder belongs to.
    pub task_id: String,
    /// Recipient, as known to the auth collaborator.
    pub owner_id: String,
    /// Delivery channel.
    pub notify_type: NotifyType,
    /// One-line summary.
    pub subject: String,
    /// Full message text.
    pub body: String,
    /// Due time rendered in the task's origin zone.
    pub due_origin: String,
    /// Due time rendered in the owner's local zone.
    pub due_local: String,
}

impl Notification {
    /// Render the message for `reminder` on `task`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTimeZone` if a stored zone no longer parses.
    pub fn render(reminder: &Reminder, task: &Task) -> Result<Self> {
        let due_origin = display_in_zone(task.origin_datetime, &task.origin_timezone)?;
        let due_local = display_in_zone(task.origin_datetime, &task.local_timezone)?;

        let subject = format!("Reminder: {}", task.title);
        let mut body = if due_origin == due_local {
            format!("\"{}\" is due {due_origin}.", task.title)
        } else {
            format!("\"{}\" is due {due_origin} ({due_local} your time).", task.title)
        };
        if let Some(description) = &task.description {
            body.push_str("\n\n");
            body.push_str(description);
        }

        Ok(Self {
            reminder_id: reminder.id.clone(),
            task_id: task.id.clone(),
            owner_id: task.owner_id.clone(),
            notify_type: reminder.notify_type,
            subject,
            body,
            due_origin,
            due_local,
        })
    }
}
