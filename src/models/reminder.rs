//! Reminder model: a notification fired a fixed number of minutes before
//! its task's origin instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, Result};

/// Largest accepted reminder offset: one leap year.
pub const MAX_OFFSET_MINUTES: i64 = 366 * 24 * 60;

/// Delivery channel for a reminder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotifyType {
    /// Email provider.
    Email,
    /// SMS provider.
    Sms,
    /// Mobile push provider.
    Push,
}

impl NotifyType {
    /// Every channel, in a stable order.
    pub const ALL: [Self; 3] = [Self::Email, Self::Sms, Self::Push];

    /// Stable lowercase name used in storage and configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        }
    }

    /// Parse a stored channel name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an unknown name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            other => Err(AppError::Validation(format!("invalid notify type: {other}"))),
        }
    }
}

/// Caller-supplied reminder request, before scheduling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReminderRequest {
    /// Minutes before the task origin at which to notify.
    pub offset_minutes: i64,
    /// Channel to notify on.
    pub notify_type: NotifyType,
}

impl ReminderRequest {
    /// Construct a request.
    #[must_use]
    pub fn new(offset_minutes: i64, notify_type: NotifyType) -> Self {
        Self {
            offset_minutes,
            notify_type,
        }
    }

    /// Validated offset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidOffset` if the offset is negative or larger
    /// than [`MAX_OFFSET_MINUTES`].
    pub fn offset(&self) -> Result<u32> {
        if !(0..=MAX_OFFSET_MINUTES).contains(&self.offset_minutes) {
            return Err(AppError::InvalidOffset(format!(
                "{} minutes is outside 0..={MAX_OFFSET_MINUTES}",
                self.offset_minutes
            )));
        }
        u32::try_from(self.offset_minutes)
            .map_err(|err| AppError::InvalidOffset(err.to_string()))
    }
}

/// A persisted reminder belonging to exactly one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Reminder {
    /// Unique record identifier.
    pub id: String,
    /// Owning task.
    pub task_id: String,
    /// Minutes before the task origin.
    pub notify_offset_minutes: u32,
    /// Delivery channel.
    pub notify_type: NotifyType,
    /// Absolute fire time: task origin minus the offset.
    pub scheduled_at: DateTime<Utc>,
    /// Whether the notification was delivered. Only ever goes false to true.
    pub sent: bool,
    /// When the notification was delivered.
    pub sent_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// Construct an unsent reminder with a generated identifier.
    #[must_use]
    pub fn new(
        task_id: String,
        notify_offset_minutes: u32,
        notify_type: NotifyType,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            notify_offset_minutes,
            notify_type,
            scheduled_at,
            sent: false,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the fire time has been reached at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }

    /// The request this reminder was built from.
    #[must_use]
    pub fn as_request(&self) -> ReminderRequest {
        ReminderRequest::new(i64::from(self.notify_offset_minutes), self.notify_type)
    }
}
