//! Task model anchored to an origin time zone.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reminder::{Reminder, ReminderRequest};
use crate::timezone;
use crate::{AppError, Result};

/// Task urgency.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Default urgency.
    #[default]
    Medium,
    /// Should be handled soon.
    High,
    /// Must not be missed.
    Critical,
}

impl Priority {
    /// Stable lowercase name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a stored priority name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an unknown name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(AppError::Validation(format!("invalid priority: {other}"))),
        }
    }
}

/// A user task with its embedded reminders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    /// Unique record identifier.
    pub id: String,
    /// Owning user, supplied by the auth collaborator.
    pub owner_id: String,
    /// Short title.
    pub title: String,
    /// Optional free text.
    pub description: Option<String>,
    /// Urgency.
    pub priority: Priority,
    /// Free-form labels.
    pub tags: BTreeSet<String>,
    /// Recurrence rule, stored verbatim.
    pub recurrence_rule: Option<String>,
    /// Due instant. Authoritative.
    pub origin_datetime: DateTime<Utc>,
    /// IANA zone the due time was specified in. Authoritative for projections.
    pub origin_timezone: String,
    /// Wall-clock projection into `local_timezone`, captured at write time.
    /// Advisory only; never used for scheduling.
    pub local_datetime: NaiveDateTime,
    /// Creating user's zone at write time.
    pub local_timezone: String,
    /// Optimistic concurrency version, incremented on every update.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Reminders owned by this task.
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

/// Input for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NewTask {
    /// Short title.
    pub title: String,
    /// Optional free text.
    #[serde(default)]
    pub description: Option<String>,
    /// Urgency.
    #[serde(default)]
    pub priority: Priority,
    /// Free-form labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Recurrence rule, stored verbatim.
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    /// Due instant.
    pub origin_datetime: DateTime<Utc>,
    /// IANA zone the due time was specified in.
    pub origin_timezone: String,
    /// Creating user's current zone; defaults to the origin zone.
    #[serde(default)]
    pub local_timezone: Option<String>,
    /// Reminders to schedule alongside the task.
    #[serde(default)]
    pub reminders: Vec<ReminderRequest>,
}

impl NewTask {
    /// Minimal task input with no reminders.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        origin_datetime: DateTime<Utc>,
        origin_timezone: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: Priority::default(),
            tags: BTreeSet::new(),
            recurrence_rule: None,
            origin_datetime,
            origin_timezone: origin_timezone.into(),
            local_timezone: None,
            reminders: Vec::new(),
        }
    }

    /// Attach reminder requests.
    #[must_use]
    pub fn with_reminders(mut self, reminders: Vec<ReminderRequest>) -> Self {
        self.reminders = reminders;
        self
    }
}

/// Partial update for a task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TaskUpdate {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description; an empty string clears it.
    #[serde(default)]
    pub description: Option<String>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Replacement tag set.
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    /// New recurrence rule; an empty string clears it.
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    /// New due instant.
    #[serde(default)]
    pub origin_datetime: Option<DateTime<Utc>>,
    /// New origin zone.
    #[serde(default)]
    pub origin_timezone: Option<String>,
    /// New local zone.
    #[serde(default)]
    pub local_timezone: Option<String>,
    /// Replacement reminder set.
    #[serde(default)]
    pub reminders: Option<Vec<ReminderRequest>>,
    /// Version the caller last read; mismatch yields `AppError::Conflict`.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl Task {
    /// Build a task for `owner_id` from validated input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty title and
    /// `AppError::InvalidTimeZone` for an unknown zone.
    pub fn from_new(owner_id: &str, input: &NewTask) -> Result<Self> {
        let title = validate_title(&input.title)?;
        timezone::parse_zone(&input.origin_timezone)?;
        let local_timezone = input
            .local_timezone
            .clone()
            .unwrap_or_else(|| input.origin_timezone.clone());
        let local_datetime = timezone::project_local(input.origin_datetime, &local_timezone)?;
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_owned(),
            title,
            description: non_empty(input.description.clone()),
            priority: input.priority,
            tags: input.tags.clone(),
            recurrence_rule: non_empty(input.recurrence_rule.clone()),
            origin_datetime: input.origin_datetime,
            origin_timezone: input.origin_timezone.clone(),
            local_datetime,
            local_timezone,
            version: 1,
            created_at: now,
            updated_at: now,
            reminders: Vec::new(),
        })
    }

    /// Apply an update in place. Returns `true` when the origin instant changed.
    ///
    /// The version is not touched here; the store increments it on write.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty title and
    /// `AppError::InvalidTimeZone` for an unknown zone.
    pub fn apply(&mut self, update: &TaskUpdate) -> Result<bool> {
        if let Some(title) = &update.title {
            self.title = validate_title(title)?;
        }
        if let Some(description) = &update.description {
            self.description = non_empty(Some(description.clone()));
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(tags) = &update.tags {
            self.tags.clone_from(tags);
        }
        if let Some(rule) = &update.recurrence_rule {
            self.recurrence_rule = non_empty(Some(rule.clone()));
        }
        if let Some(zone) = &update.origin_timezone {
            timezone::parse_zone(zone)?;
            self.origin_timezone.clone_from(zone);
        }
        if let Some(zone) = &update.local_timezone {
            timezone::parse_zone(zone)?;
            self.local_timezone.clone_from(zone);
        }
        let origin_changed = update
            .origin_datetime
            .is_some_and(|origin| origin != self.origin_datetime);
        if let Some(origin) = update.origin_datetime {
            self.origin_datetime = origin;
        }
        self.local_datetime = timezone::project_local(self.origin_datetime, &self.local_timezone)?;
        self.updated_at = Utc::now();
        Ok(origin_changed)
    }
}

fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    Ok(trimmed.to_owned())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
