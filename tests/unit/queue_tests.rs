//! Unit tests for the `SQLite`-backed notification queue.

use std::sync::Arc;

use chrono::Utc;

use reminder_scheduler::models::job::DeliveryJob;
use reminder_scheduler::models::reminder::{NotifyType, Reminder};
use reminder_scheduler::persistence::db::{self, Database};
use reminder_scheduler::queue::{NotificationQueue, SqliteQueue};

async fn queue() -> (Arc<Database>, SqliteQueue) {
    let database = Arc::new(db::connect_memory().await.expect("db connect"));
    (Arc::clone(&database), SqliteQueue::new(database))
}

fn job(reminder_id: &str) -> DeliveryJob {
    let mut reminder = Reminder::new("t1".into(), 0, NotifyType::Email, Utc::now());
    reminder.id = reminder_id.to_owned();
    DeliveryJob::for_reminder(&reminder)
}

#[tokio::test]
async fn peek_is_fifo_and_non_destructive() {
    let (_db, q) = queue().await;
    let jobs = [job("r1"), job("r2"), job("r3")];
    for j in &jobs {
        q.push(j).await.expect("push");
    }

    let first = q.peek_batch(10).await.expect("peek");
    let second = q.peek_batch(10).await.expect("peek again");
    assert_eq!(first, jobs);
    assert_eq!(second, jobs);
    assert_eq!(q.depth().await.expect("depth"), 3);
}

#[tokio::test]
async fn peek_respects_batch_limit() {
    let (_db, q) = queue().await;
    for id in ["r1", "r2", "r3"] {
        q.push(&job(id)).await.expect("push");
    }
    let batch = q.peek_batch(2).await.expect("peek");
    let ids: Vec<_> = batch.iter().map(|j| j.reminder_id.as_str()).collect();
    assert_eq!(ids, ["r1", "r2"]);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let (_db, q) = queue().await;
    let j = job("r1");
    q.push(&j).await.expect("push");

    q.remove(&j).await.expect("remove");
    q.remove(&j).await.expect("second remove is a no-op");
    assert!(q.peek_batch(10).await.expect("peek").is_empty());
}

#[tokio::test]
async fn duplicate_job_id_is_a_queue_error() {
    let (_db, q) = queue().await;
    let j = job("r1");
    q.push(&j).await.expect("push");
    let err = q.push(&j).await.expect_err("duplicate job id");
    assert!(err.to_string().starts_with("queue:"), "{err}");
}

#[tokio::test]
async fn queued_reminder_ids_are_distinct() {
    let (_db, q) = queue().await;
    q.push(&job("r1")).await.expect("push");
    q.push(&job("r1")).await.expect("push");
    q.push(&job("r2")).await.expect("push");

    let ids = q.queued_reminder_ids().await.expect("ids");
    assert_eq!(ids.len(), 2);
    assert!(ids.contains("r1") && ids.contains("r2"));
}

#[tokio::test]
async fn corrupt_record_is_dropped() {
    let (database, q) = queue().await;
    q.push(&job("r1")).await.expect("push");
    sqlx::query(
        "INSERT INTO delivery_queue (job_id, reminder_id, payload, enqueued_at)
         VALUES ('bad', 'r?', 'not json', '2025-01-01T00:00:00.000000Z')",
    )
    .execute(database.as_ref())
    .await
    .expect("insert corrupt row");
    q.push(&job("r2")).await.expect("push");

    let batch = q.peek_batch(10).await.expect("peek");
    let ids: Vec<_> = batch.iter().map(|j| j.reminder_id.as_str()).collect();
    assert_eq!(ids, ["r1", "r2"]);
    assert_eq!(q.depth().await.expect("depth"), 2);
}
