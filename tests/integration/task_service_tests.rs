//! Task service behaviour: validation, ownership, versioning and reminder
//! recomputation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use reminder_scheduler::models::reminder::{NotifyType, ReminderRequest, MAX_OFFSET_MINUTES};
use reminder_scheduler::models::task::{NewTask, TaskUpdate};
use reminder_scheduler::persistence::task_repo::TaskRepo;
use reminder_scheduler::AppError;

use super::test_helpers::{harness, utc};

const ORIGIN: &str = "2025-10-26T09:30:00Z";

fn input() -> NewTask {
    NewTask::new("Renew passport", utc(ORIGIN), "Europe/Lisbon").with_reminders(vec![
        ReminderRequest::new(60, NotifyType::Email),
        ReminderRequest::new(10, NotifyType::Push),
    ])
}

#[tokio::test]
async fn invalid_input_persists_nothing() {
    let h = harness().await;

    let bad_offset = input().with_reminders(vec![
        ReminderRequest::new(30, NotifyType::Email),
        ReminderRequest::new(-5, NotifyType::Sms),
    ]);
    let err = h
        .service
        .create_task("alice", &bad_offset)
        .await
        .expect_err("negative offset");
    assert!(matches!(err, AppError::InvalidOffset(_)));

    let mut bad_zone = input();
    bad_zone.origin_timezone = "Atlantis/Capital".into();
    let err = h
        .service
        .create_task("alice", &bad_zone)
        .await
        .expect_err("unknown zone");
    assert!(matches!(err, AppError::InvalidTimeZone(_)));

    let mut blank = input();
    blank.title = "   ".into();
    let err = h.service.create_task("alice", &blank).await.expect_err("blank title");
    assert!(matches!(err, AppError::Validation(_)));

    assert!(h.service.list_tasks("alice").await.expect("list").is_empty());
    assert_eq!(h.depth().await, 0);
}

#[tokio::test]
async fn offset_upper_bound_is_inclusive() {
    let h = harness().await;
    let at_limit = input().with_reminders(vec![ReminderRequest::new(
        MAX_OFFSET_MINUTES,
        NotifyType::Email,
    )]);
    h.service.create_task("alice", &at_limit).await.expect("at limit");

    let over = input().with_reminders(vec![ReminderRequest::new(
        MAX_OFFSET_MINUTES + 1,
        NotifyType::Email,
    )]);
    let err = h.service.create_task("alice", &over).await.expect_err("over limit");
    assert!(matches!(err, AppError::InvalidOffset(_)));
}

#[tokio::test]
async fn fire_time_out_of_range_is_invalid_offset() {
    let h = harness().await;
    let origin = DateTime::<Utc>::MIN_UTC + Duration::minutes(30);
    let input = NewTask::new("Ancient history", origin, "UTC").with_reminders(vec![
        ReminderRequest::new(MAX_OFFSET_MINUTES, NotifyType::Email),
    ]);

    let err = h
        .service
        .create_task("alice", &input)
        .await
        .expect_err("fire time underflows");
    assert!(matches!(err, AppError::InvalidOffset(_)), "{err}");
    assert!(h.service.list_tasks("alice").await.expect("list").is_empty());
    assert_eq!(h.depth().await, 0);
}

#[tokio::test]
async fn create_schedules_one_job_per_reminder() {
    let h = harness().await;
    let task = h.service.create_task("alice", &input()).await.expect("create");

    assert_eq!(task.version, 1);
    assert_eq!(task.local_timezone, "Europe/Lisbon");
    assert_eq!(h.depth().await, 2);
    let origin = utc(ORIGIN);
    for reminder in &task.reminders {
        let offset = Duration::minutes(i64::from(reminder.notify_offset_minutes));
        assert_eq!(reminder.scheduled_at, origin - offset);
        assert!(!reminder.sent);
    }
}

#[tokio::test]
async fn other_owners_see_not_found() {
    let h = harness().await;
    let task = h.service.create_task("alice", &input()).await.expect("create");

    let not_found = |err: AppError| matches!(err, AppError::NotFound(_));
    assert!(not_found(
        h.service.get_task("mallory", &task.id).await.expect_err("get")
    ));
    assert!(not_found(
        h.service
            .update_task("mallory", &task.id, &TaskUpdate::default())
            .await
            .expect_err("update")
    ));
    assert!(not_found(
        h.service
            .add_reminders("mallory", &task.id, &[ReminderRequest::new(1, NotifyType::Sms)])
            .await
            .expect_err("add reminders")
    ));
    assert!(not_found(
        h.service
            .list_reminders("mallory", &task.id)
            .await
            .expect_err("list reminders")
    ));
    assert!(not_found(
        h.service
            .delete_reminder("mallory", &task.reminders[0].id)
            .await
            .expect_err("delete reminder")
    ));
    assert!(not_found(
        h.service.delete_task("mallory", &task.id).await.expect_err("delete")
    ));

    assert!(h.service.list_tasks("mallory").await.expect("list").is_empty());
    h.service.get_task("alice", &task.id).await.expect("still there");
}

#[tokio::test]
async fn stale_expected_version_conflicts() {
    let h = harness().await;
    let task = h.service.create_task("alice", &input()).await.expect("create");

    let first = TaskUpdate {
        title: Some("Renew passport today".into()),
        expected_version: Some(1),
        ..TaskUpdate::default()
    };
    let updated = h
        .service
        .update_task("alice", &task.id, &first)
        .await
        .expect("first writer");
    assert_eq!(updated.version, 2);

    let second = TaskUpdate {
        title: Some("Renew passport tomorrow".into()),
        expected_version: Some(1),
        ..TaskUpdate::default()
    };
    let err = h
        .service
        .update_task("alice", &task.id, &second)
        .await
        .expect_err("second writer is stale");
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(err.is_retryable());

    let stored = h.service.get_task("alice", &task.id).await.expect("get");
    assert_eq!(stored.title, "Renew passport today");
}

#[tokio::test]
async fn origin_change_alone_resubmits_existing_offsets() {
    let h = harness().await;
    let task = h.service.create_task("alice", &input()).await.expect("create");
    let moved = utc(ORIGIN) + Duration::hours(3);

    let updated = h
        .service
        .update_task(
            "alice",
            &task.id,
            &TaskUpdate {
                origin_datetime: Some(moved),
                ..TaskUpdate::default()
            },
        )
        .await
        .expect("update");

    let mut before: Vec<_> = task.reminders.iter().map(|r| r.as_request()).collect();
    let mut after: Vec<_> = updated.reminders.iter().map(|r| r.as_request()).collect();
    before.sort_by_key(|r| r.offset_minutes);
    after.sort_by_key(|r| r.offset_minutes);
    assert_eq!(before, after);
    for reminder in &updated.reminders {
        let offset = Duration::minutes(i64::from(reminder.notify_offset_minutes));
        assert_eq!(reminder.scheduled_at, moved - offset);
        assert!(task.reminders.iter().all(|old| old.id != reminder.id));
    }
    // Two original jobs plus two for the replacements.
    assert_eq!(h.depth().await, 4);
}

#[tokio::test]
async fn update_without_origin_change_keeps_reminders() {
    let h = harness().await;
    let task = h.service.create_task("alice", &input()).await.expect("create");

    let updated = h
        .service
        .update_task(
            "alice",
            &task.id,
            &TaskUpdate {
                local_timezone: Some("America/Sao_Paulo".into()),
                ..TaskUpdate::default()
            },
        )
        .await
        .expect("update");

    let mut before: Vec<_> = task.reminders.iter().map(|r| r.id.clone()).collect();
    let mut after: Vec<_> = updated.reminders.iter().map(|r| r.id.clone()).collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);
    assert_eq!(updated.local_timezone, "America/Sao_Paulo");
    assert_ne!(updated.local_datetime, task.local_datetime);
    assert_eq!(h.depth().await, 2);
}

#[tokio::test]
async fn failed_update_leaves_task_unchanged() {
    let h = harness().await;
    let task = h.service.create_task("alice", &input()).await.expect("create");

    let err = h
        .service
        .update_task(
            "alice",
            &task.id,
            &TaskUpdate {
                title: Some("changed".into()),
                reminders: Some(vec![ReminderRequest::new(-1, NotifyType::Email)]),
                ..TaskUpdate::default()
            },
        )
        .await
        .expect_err("bad offset");
    assert!(matches!(err, AppError::InvalidOffset(_)));

    let stored = TaskRepo::new(Arc::clone(&h.db))
        .get(&task.id, "alice")
        .await
        .expect("get");
    assert_eq!(stored.title, "Renew passport");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.reminders.len(), 2);
}

#[tokio::test]
async fn reminders_can_be_added_listed_and_removed() {
    let h = harness().await;
    let task = h
        .service
        .create_task("alice", &NewTask::new("Call mum", utc(ORIGIN), "UTC"))
        .await
        .expect("create");

    let added = h
        .service
        .add_reminders(
            "alice",
            &task.id,
            &[
                ReminderRequest::new(5, NotifyType::Sms),
                ReminderRequest::new(15, NotifyType::Push),
            ],
        )
        .await
        .expect("add");
    assert_eq!(added.len(), 2);
    assert_eq!(h.depth().await, 2);

    h.service
        .delete_reminder("alice", &added[0].id)
        .await
        .expect("delete one");
    let remaining = h.service.list_reminders("alice", &task.id).await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, added[1].id);

    let removed = h
        .service
        .delete_reminders("alice", &task.id)
        .await
        .expect("delete all");
    assert_eq!(removed, 1);
    assert!(h
        .service
        .list_reminders("alice", &task.id)
        .await
        .expect("list")
        .is_empty());
}
