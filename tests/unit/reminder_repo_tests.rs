//! Unit tests for the reminder repository: ownership, `sent` marking and
//! dispatch claims.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use reminder_scheduler::models::reminder::{NotifyType, Reminder, ReminderRequest};
use reminder_scheduler::models::task::{NewTask, Task};
use reminder_scheduler::persistence::db::{self, Database};
use reminder_scheduler::persistence::reminder_repo::ReminderRepo;
use reminder_scheduler::persistence::task_repo::TaskRepo;
use reminder_scheduler::scheduler::build_reminders;
use reminder_scheduler::AppError;

struct Fixture {
    db: Arc<Database>,
    reminders: ReminderRepo,
    task: Task,
}

async fn fixture(origin: DateTime<Utc>) -> Fixture {
    let database = Arc::new(db::connect_memory().await.expect("db connect"));
    let task = Task::from_new("alice", &NewTask::new("task", origin, "UTC")).expect("valid");
    TaskRepo::new(Arc::clone(&database))
        .create(&task, &[])
        .await
        .expect("create task");
    Fixture {
        reminders: ReminderRepo::new(Arc::clone(&database)),
        db: database,
        task,
    }
}

fn build(task: &Task, offsets: &[i64]) -> Vec<Reminder> {
    let requests: Vec<_> = offsets
        .iter()
        .map(|offset| ReminderRequest::new(*offset, NotifyType::Sms))
        .collect();
    build_reminders(task, &requests).expect("valid reminders")
}

#[tokio::test]
async fn create_batch_and_list() {
    let f = fixture(Utc::now() + Duration::hours(3)).await;
    let built = build(&f.task, &[10, 120]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");

    let listed = f.reminders.list_for_task("alice", &f.task.id).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].notify_offset_minutes, 120);
    assert!(listed.iter().all(|r| !r.sent && r.sent_at.is_none()));
}

#[tokio::test]
async fn create_batch_for_foreign_task_is_not_found() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[10]);
    let err = f
        .reminders
        .create_batch("mallory", &f.task.id, &built)
        .await
        .expect_err("not owned");
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(f.reminders.get_by_id(&built[0].id).await.expect("get").is_none());
}

#[tokio::test]
async fn list_and_delete_for_foreign_task_are_not_found() {
    let f = fixture(Utc::now()).await;
    assert!(matches!(
        f.reminders.list_for_task("mallory", &f.task.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        f.reminders.delete_for_task("mallory", &f.task.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_for_task_removes_all() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[1, 2, 3]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");
    let removed = f
        .reminders
        .delete_for_task("alice", &f.task.id)
        .await
        .expect("delete");
    assert_eq!(removed, 3);
    assert!(f
        .reminders
        .list_for_task("alice", &f.task.id)
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn delete_single_reminder_is_owner_scoped() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[1]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");

    assert!(matches!(
        f.reminders.delete("mallory", &built[0].id).await,
        Err(AppError::NotFound(_))
    ));
    let task_id = f.reminders.delete("alice", &built[0].id).await.expect("delete");
    assert_eq!(task_id, f.task.id);
    assert!(matches!(
        f.reminders.delete("alice", &built[0].id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn mark_sent_only_once() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[0]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");

    let first_at = Utc::now();
    assert!(f.reminders.mark_sent(&built[0].id, first_at).await.expect("mark"));
    assert!(!f
        .reminders
        .mark_sent(&built[0].id, first_at + Duration::minutes(1))
        .await
        .expect("mark again"));

    let stored = f.reminders.get_by_id(&built[0].id).await.expect("get").expect("present");
    assert!(stored.sent);
    assert_eq!(
        stored.sent_at.map(|t| t.timestamp_micros()),
        Some(first_at.timestamp_micros())
    );
}

#[tokio::test]
async fn sent_flag_cannot_be_cleared_even_by_raw_sql() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[0]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");
    f.reminders.mark_sent(&built[0].id, Utc::now()).await.expect("mark");

    let result = sqlx::query("UPDATE reminder SET sent = 0 WHERE id = ?1")
        .bind(&built[0].id)
        .execute(f.db.as_ref())
        .await;
    assert!(result.is_err(), "trigger must abort clearing sent");

    let stored = f.reminders.get_by_id(&built[0].id).await.expect("get").expect("present");
    assert!(stored.sent);
}

#[tokio::test]
async fn claim_is_exclusive_until_lease_expires() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[0]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");
    let id = &built[0].id;
    let now = Utc::now();
    let lease = Duration::seconds(30);

    assert!(f.reminders.claim(id, now, now + lease).await.expect("claim"));
    assert!(!f.reminders.claim(id, now, now + lease).await.expect("second claim"));

    let after_expiry = now + lease + Duration::seconds(1);
    assert!(f
        .reminders
        .claim(id, after_expiry, after_expiry + lease)
        .await
        .expect("claim after expiry"));
}

#[tokio::test]
async fn released_claim_can_be_retaken() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[0]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");
    let id = &built[0].id;
    let now = Utc::now();

    assert!(f.reminders.claim(id, now, now + Duration::seconds(30)).await.expect("claim"));
    f.reminders.release_claim(id).await.expect("release");
    assert!(f.reminders.claim(id, now, now + Duration::seconds(30)).await.expect("reclaim"));
}

#[tokio::test]
async fn sent_reminder_cannot_be_claimed() {
    let f = fixture(Utc::now()).await;
    let built = build(&f.task, &[0]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");
    f.reminders.mark_sent(&built[0].id, Utc::now()).await.expect("mark");

    let now = Utc::now();
    assert!(!f
        .reminders
        .claim(&built[0].id, now, now + Duration::seconds(30))
        .await
        .expect("claim"));
}

#[tokio::test]
async fn list_unsent_due_filters_future_and_sent() {
    let now = Utc::now();
    let f = fixture(now + Duration::hours(1)).await;
    // 120 min before origin is due; 30 min before is an hour out; 90 is due but sent.
    let built = build(&f.task, &[120, 30, 90]);
    f.reminders
        .create_batch("alice", &f.task.id, &built)
        .await
        .expect("create");
    f.reminders.mark_sent(&built[2].id, now).await.expect("mark");

    let due = f.reminders.list_unsent_due(now).await.expect("list");
    let ids: Vec<_> = due.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, [built[0].id.as_str()]);
}
