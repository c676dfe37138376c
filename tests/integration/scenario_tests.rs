//! End-to-end delivery scenarios: schedule, delete, concurrent poll and
//! origin change.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;

use reminder_scheduler::models::reminder::{NotifyType, ReminderRequest};
use reminder_scheduler::models::task::{NewTask, TaskUpdate};
use reminder_scheduler::persistence::reminder_repo::ReminderRepo;
use reminder_scheduler::queue::NotificationQueue;
use reminder_scheduler::timezone::{parse_origin, to_zoned_time};

use super::test_helpers::{harness, recording_registry, utc, RecordingDispatcher};

fn new_york_task() -> NewTask {
    let origin = parse_origin("2025-06-01T15:00:00", "America/New_York").expect("valid origin");
    NewTask::new("Dentist", origin, "America/New_York")
        .with_reminders(vec![ReminderRequest::new(60, NotifyType::Email)])
}

#[tokio::test]
async fn scheduled_reminder_is_sent_exactly_once() {
    let h = harness().await;
    let task = h
        .service
        .create_task("alice", &new_york_task())
        .await
        .expect("create");

    let reminder = &task.reminders[0];
    assert_eq!(reminder.scheduled_at, utc("2025-06-01T18:00:00Z"));
    let local = to_zoned_time(reminder.scheduled_at, "America/New_York").expect("zone");
    assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2025-06-01 14:00");
    assert_eq!(h.depth().await, 1);

    // 14:01 in New York.
    let report = h
        .worker
        .run_cycle(utc("2025-06-01T18:01:00Z"))
        .await
        .expect("cycle");
    assert_eq!(report.processed_count, 1);
    assert_eq!(h.recorder.delivered(), [reminder.id.clone()]);

    let stored = ReminderRepo::new(Arc::clone(&h.db))
        .get_by_id(&reminder.id)
        .await
        .expect("get")
        .expect("present");
    assert!(stored.sent);
    assert!(stored.sent_at.is_some());
    assert_eq!(h.depth().await, 0);
}

#[tokio::test]
async fn deleted_task_leaves_stale_job_that_is_discarded() {
    let h = harness().await;
    let task = h
        .service
        .create_task("alice", &new_york_task())
        .await
        .expect("create");
    let reminder_id = task.reminders[0].id.clone();

    h.service.delete_task("alice", &task.id).await.expect("delete");
    assert!(ReminderRepo::new(Arc::clone(&h.db))
        .get_by_id(&reminder_id)
        .await
        .expect("get")
        .is_none());
    assert_eq!(h.depth().await, 1);

    let report = h
        .worker
        .run_cycle(utc("2025-06-01T18:01:00Z"))
        .await
        .expect("cycle");
    assert_eq!(report.stale_removed, 1);
    assert_eq!(report.processed_count, 0);
    assert!(h.recorder.delivered().is_empty());
    assert_eq!(h.depth().await, 0);
}

#[tokio::test]
async fn concurrent_workers_on_same_job_deliver_once() {
    let h = harness().await;
    h.service
        .create_task("alice", &new_york_task())
        .await
        .expect("create");

    let other_recorder = Arc::new(RecordingDispatcher::default());
    let other = h.worker_with(recording_registry(&other_recorder));
    let now = utc("2025-06-01T18:01:00Z");

    let (first, second) = tokio::join!(h.worker.run_cycle(now), other.run_cycle(now));
    let first = first.expect("first cycle");
    let second = second.expect("second cycle");

    assert_eq!(first.processed_count + second.processed_count, 1);
    assert_eq!(
        h.recorder.delivered().len() + other_recorder.delivered().len(),
        1
    );
    assert_eq!(h.depth().await, 0);
}

#[tokio::test]
async fn worker_refetch_skips_already_sent_reminder() {
    let h = harness().await;
    let task = h
        .service
        .create_task("alice", &new_york_task())
        .await
        .expect("create");
    let now = utc("2025-06-01T18:01:00Z");

    // Snapshot the job before the first worker removes it, then put it
    // back to model a second worker holding a stale read of the queue.
    let pending = h.queue.peek_batch(10).await.expect("peek");
    h.worker.run_cycle(now).await.expect("first cycle");
    for job in &pending {
        h.queue.push(job).await.expect("re-push");
    }

    let other_recorder = Arc::new(RecordingDispatcher::default());
    let other = h.worker_with(recording_registry(&other_recorder));
    let report = other.run_cycle(now).await.expect("second cycle");

    assert_eq!(report.processed_count, 0);
    assert_eq!(report.stale_removed, 1);
    assert!(other_recorder.delivered().is_empty());
    assert_eq!(h.recorder.delivered(), [task.reminders[0].id.clone()]);
}

#[tokio::test]
async fn origin_change_recomputes_reminders_without_orphans() {
    let h = harness().await;
    let origin = utc("2025-09-10T12:00:00Z");
    let requests = vec![
        ReminderRequest::new(30, NotifyType::Push),
        ReminderRequest::new(1440, NotifyType::Email),
    ];
    let task = h
        .service
        .create_task(
            "alice",
            &NewTask::new("Launch", origin, "Europe/Berlin").with_reminders(requests.clone()),
        )
        .await
        .expect("create");
    let old_ids: HashSet<_> = task.reminders.iter().map(|r| r.id.clone()).collect();

    let moved = origin + Duration::days(2);
    let updated = h
        .service
        .update_task(
            "alice",
            &task.id,
            &TaskUpdate {
                origin_datetime: Some(moved),
                reminders: Some(requests),
                expected_version: Some(task.version),
                ..TaskUpdate::default()
            },
        )
        .await
        .expect("update");

    assert_eq!(updated.version, task.version + 1);
    assert_eq!(updated.reminders.len(), 2);
    for reminder in &updated.reminders {
        assert!(!old_ids.contains(&reminder.id));
        let offset = Duration::minutes(i64::from(reminder.notify_offset_minutes));
        assert_eq!(reminder.scheduled_at, moved - offset);
    }

    let stored = h
        .service
        .list_reminders("alice", &task.id)
        .await
        .expect("list");
    let stored_ids: HashSet<_> = stored.iter().map(|r| r.id.clone()).collect();
    assert!(stored_ids.is_disjoint(&old_ids));
    assert_eq!(stored.len(), 2);

    // Jobs for the replaced reminders are discarded; only the new ones fire.
    let report = h
        .worker
        .run_cycle(moved + Duration::hours(1))
        .await
        .expect("cycle");
    assert_eq!(report.stale_removed, 2);
    assert_eq!(report.processed_count, 2);
    let delivered: HashSet<_> = h.recorder.delivered().into_iter().collect();
    assert_eq!(delivered, stored_ids);
}
