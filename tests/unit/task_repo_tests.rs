//! Unit tests for the task repository.
//!
//! Validates:
//! - Owner scoping reports foreign tasks as `NotFound`
//! - Listing order and embedded reminders
//! - Optimistic versioning on update
//! - Atomic reminder replacement and cascading delete

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use reminder_scheduler::models::reminder::{NotifyType, Reminder, ReminderRequest};
use reminder_scheduler::models::task::{NewTask, Task, TaskUpdate};
use reminder_scheduler::persistence::db;
use reminder_scheduler::persistence::reminder_repo::ReminderRepo;
use reminder_scheduler::persistence::task_repo::TaskRepo;
use reminder_scheduler::scheduler::build_reminders;
use reminder_scheduler::AppError;

async fn repos() -> (TaskRepo, ReminderRepo) {
    let database = Arc::new(db::connect_memory().await.expect("db connect"));
    (
        TaskRepo::new(Arc::clone(&database)),
        ReminderRepo::new(database),
    )
}

fn task(owner: &str, title: &str, origin: DateTime<Utc>) -> Task {
    Task::from_new(owner, &NewTask::new(title, origin, "Europe/Paris")).expect("valid task")
}

fn reminders_for(task: &Task, offsets: &[i64]) -> Vec<Reminder> {
    let requests: Vec<_> = offsets
        .iter()
        .map(|offset| ReminderRequest::new(*offset, NotifyType::Email))
        .collect();
    build_reminders(task, &requests).expect("valid reminders")
}

#[tokio::test]
async fn create_and_get_round_trip() {
    let (tasks, _) = repos().await;
    let origin = DateTime::parse_from_rfc3339("2025-07-01T09:00:00Z")
        .expect("valid fixture")
        .with_timezone(&Utc);
    let mut input = NewTask::new("Pay rent", origin, "Europe/Paris");
    input.tags.insert("money".into());
    input.description = Some("before the 5th".into());
    input.recurrence_rule = Some("FREQ=MONTHLY".into());
    input.local_timezone = Some("America/Chicago".into());
    let new = Task::from_new("alice", &input).expect("valid task");
    let reminders = reminders_for(&new, &[60, 1440]);

    tasks.create(&new, &reminders).await.expect("create");
    let stored = tasks.get(&new.id, "alice").await.expect("get");

    assert_eq!(stored.title, "Pay rent");
    assert_eq!(stored.description.as_deref(), Some("before the 5th"));
    assert_eq!(stored.recurrence_rule.as_deref(), Some("FREQ=MONTHLY"));
    assert!(stored.tags.contains("money"));
    assert_eq!(stored.local_timezone, "America/Chicago");
    assert_eq!(stored.local_datetime, new.local_datetime);
    assert_eq!(stored.version, 1);
    assert_eq!(stored.origin_datetime, origin);
    assert_eq!(stored.reminders.len(), 2);
    // Earliest fire time first.
    assert_eq!(stored.reminders[0].notify_offset_minutes, 1440);
}

#[tokio::test]
async fn foreign_owner_gets_not_found() {
    let (tasks, _) = repos().await;
    let new = task("alice", "secret", Utc::now());
    tasks.create(&new, &[]).await.expect("create");

    let err = tasks.get(&new.id, "mallory").await.expect_err("not owned");
    assert!(matches!(err, AppError::NotFound(_)));
    let err = tasks.delete(&new.id, "mallory").await.expect_err("not owned");
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(tasks.get(&new.id, "alice").await.is_ok());
}

#[tokio::test]
async fn list_is_owner_scoped_and_ordered_by_due_time() {
    let (tasks, _) = repos().await;
    let now = Utc::now();
    let later = task("alice", "later", now + Duration::days(2));
    let sooner = task("alice", "sooner", now + Duration::days(1));
    let other = task("bob", "bob's", now);
    tasks.create(&later, &reminders_for(&later, &[10])).await.expect("create");
    tasks.create(&sooner, &[]).await.expect("create");
    tasks.create(&other, &[]).await.expect("create");

    let listed = tasks.list("alice").await.expect("list");
    let titles: Vec<_> = listed.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["sooner", "later"]);
    assert_eq!(listed[1].reminders.len(), 1);
    assert!(listed[0].reminders.is_empty());

    assert!(tasks.list("nobody").await.expect("list").is_empty());
}

#[tokio::test]
async fn update_bumps_version_and_rejects_stale_writer() {
    let (tasks, _) = repos().await;
    let new = task("alice", "draft", Utc::now());
    tasks.create(&new, &[]).await.expect("create");

    let mut edited = new.clone();
    edited
        .apply(&TaskUpdate {
            title: Some("final".into()),
            ..TaskUpdate::default()
        })
        .expect("apply");
    let updated = tasks.update(&edited, 1, None).await.expect("update");
    assert_eq!(updated.version, 2);
    assert_eq!(updated.title, "final");

    let err = tasks.update(&edited, 1, None).await.expect_err("stale version");
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(tasks.get(&new.id, "alice").await.expect("get").version, 2);
}

#[tokio::test]
async fn update_of_missing_task_is_not_found() {
    let (tasks, _) = repos().await;
    let ghost = task("alice", "ghost", Utc::now());
    let err = tasks.update(&ghost, 1, None).await.expect_err("missing");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn update_replaces_reminders_atomically() {
    let (tasks, reminders) = repos().await;
    let new = task("alice", "meeting", Utc::now() + Duration::hours(5));
    let original = reminders_for(&new, &[30, 60]);
    tasks.create(&new, &original).await.expect("create");

    let replacement = reminders_for(&new, &[15]);
    let updated = tasks
        .update(&new, 1, Some(&replacement))
        .await
        .expect("update");
    assert_eq!(updated.reminders.len(), 1);
    assert_eq!(updated.reminders[0].id, replacement[0].id);
    for old in &original {
        assert!(reminders.get_by_id(&old.id).await.expect("get").is_none());
    }
}

#[tokio::test]
async fn failed_update_leaves_reminders_untouched() {
    let (tasks, reminders) = repos().await;
    let new = task("alice", "meeting", Utc::now() + Duration::hours(5));
    let original = reminders_for(&new, &[30]);
    tasks.create(&new, &original).await.expect("create");

    let replacement = reminders_for(&new, &[15]);
    let err = tasks
        .update(&new, 7, Some(&replacement))
        .await
        .expect_err("stale version");
    assert!(matches!(err, AppError::Conflict(_)));

    assert!(reminders.get_by_id(&original[0].id).await.expect("get").is_some());
    assert!(reminders.get_by_id(&replacement[0].id).await.expect("get").is_none());
}

#[tokio::test]
async fn delete_cascades_to_reminders() {
    let (tasks, reminders) = repos().await;
    let new = task("alice", "gone", Utc::now());
    let created = reminders_for(&new, &[5, 10]);
    tasks.create(&new, &created).await.expect("create");

    tasks.delete(&new.id, "alice").await.expect("delete");

    assert!(tasks.find_by_id(&new.id).await.expect("find").is_none());
    for reminder in &created {
        assert!(reminders.get_by_id(&reminder.id).await.expect("get").is_none());
    }
}

#[tokio::test]
async fn find_by_id_ignores_owner() {
    let (tasks, _) = repos().await;
    let new = task("alice", "worker view", Utc::now());
    tasks.create(&new, &[]).await.expect("create");
    let found = tasks.find_by_id(&new.id).await.expect("find").expect("present");
    assert_eq!(found.owner_id, "alice");
}
