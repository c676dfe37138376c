//! Route handlers and wire types.
//!
//! Origin datetimes arrive as strings: either an RFC 3339 instant or a
//! wall-clock time interpreted in the request's origin zone.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{AppState, OwnerId};
use crate::models::reminder::{Reminder, ReminderRequest};
use crate::models::task::{NewTask, Priority, Task, TaskUpdate};
use crate::reconcile::SweepReport;
use crate::timezone::parse_origin;
use crate::worker::CycleReport;
use crate::Result;

type Shared = State<Arc<AppState>>;

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
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
    /// Due time, RFC 3339 or wall-clock in `origin_timezone`.
    pub origin_datetime: String,
    /// IANA zone the due time is specified in.
    pub origin_timezone: String,
    /// Caller's current zone.
    #[serde(default)]
    pub local_timezone: Option<String>,
    /// Reminders to schedule with the task.
    #[serde(default)]
    pub reminders: Vec<ReminderRequest>,
}

impl CreateTaskRequest {
    fn into_new_task(self) -> Result<NewTask> {
        let origin = parse_origin(&self.origin_datetime, &self.origin_timezone)?;
        Ok(NewTask {
            title: self.title,
            description: self.description,
            priority: self.priority,
            tags: self.tags,
            recurrence_rule: self.recurrence_rule,
            origin_datetime: origin,
            origin_timezone: self.origin_timezone,
            local_timezone: self.local_timezone,
            reminders: self.reminders,
        })
    }
}

/// Body of `PUT /tasks/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description; empty clears it.
    #[serde(default)]
    pub description: Option<String>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Replacement tag set.
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    /// New recurrence rule; empty clears it.
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    /// New due time, RFC 3339 or wall-clock in the (new or current) origin zone.
    #[serde(default)]
    pub origin_datetime: Option<String>,
    /// New origin zone.
    #[serde(default)]
    pub origin_timezone: Option<String>,
    /// New local zone.
    #[serde(default)]
    pub local_timezone: Option<String>,
    /// Replacement reminder set.
    #[serde(default)]
    pub reminders: Option<Vec<ReminderRequest>>,
    /// Version the caller last read.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Body of `POST /tasks/{id}/reminders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRemindersRequest {
    /// Reminders to add.
    pub reminders: Vec<ReminderRequest>,
}

/// Response of `DELETE /tasks/{id}/reminders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedResponse {
    /// Number of reminders removed.
    pub removed: u64,
}

/// `POST /tasks`
pub async fn create_task(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>)> {
    let input = body.into_new_task()?;
    let task = state.service.create_task(&owner, &input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /tasks`
pub async fn list_tasks(State(state): Shared, OwnerId(owner): OwnerId) -> Result<Json<Vec<Task>>> {
    Ok(Json(state.service.list_tasks(&owner).await?))
}

/// `GET /tasks/{id}`
pub async fn get_task(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    Ok(Json(state.service.get_task(&owner, &id).await?))
}

/// `PUT /tasks/{id}`
pub async fn update_task(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Task>> {
    let origin_datetime = match &body.origin_datetime {
        Some(raw) => {
            let zone = match &body.origin_timezone {
                Some(zone) => zone.clone(),
                None => state.service.get_task(&owner, &id).await?.origin_timezone,
            };
            Some(parse_origin(raw, &zone)?)
        }
        None => None,
    };

    let update = TaskUpdate {
        title: body.title,
        description: body.description,
        priority: body.priority,
        tags: body.tags,
        recurrence_rule: body.recurrence_rule,
        origin_datetime,
        origin_timezone: body.origin_timezone,
        local_timezone: body.local_timezone,
        reminders: body.reminders,
        expected_version: body.expected_version,
    };
    Ok(Json(state.service.update_task(&owner, &id, &update).await?))
}

/// `DELETE /tasks/{id}`
pub async fn delete_task(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete_task(&owner, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /tasks/{id}/reminders`
pub async fn add_reminders(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
    Json(body): Json<AddRemindersRequest>,
) -> Result<(StatusCode, Json<Vec<Reminder>>)> {
    let created = state
        .service
        .add_reminders(&owner, &id, &body.reminders)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /tasks/{id}/reminders`
pub async fn list_reminders(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reminder>>> {
    Ok(Json(state.service.list_reminders(&owner, &id).await?))
}

/// `DELETE /tasks/{id}/reminders`
pub async fn delete_reminders(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<RemovedResponse>> {
    let removed = state.service.delete_reminders(&owner, &id).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// `DELETE /reminders/{id}`
pub async fn delete_reminder(
    State(state): Shared,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete_reminder(&owner, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /worker/run`
pub async fn run_worker(State(state): Shared) -> Result<Json<CycleReport>> {
    Ok(Json(state.worker.run_cycle(Utc::now()).await?))
}

/// `POST /worker/reconcile`
pub async fn reconcile(State(state): Shared) -> Result<Json<SweepReport>> {
    Ok(Json(state.reconciler.sweep(Utc::now()).await?))
}
