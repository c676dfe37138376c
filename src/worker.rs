//! Notification worker: drains due delivery jobs to channel dispatchers.
//!
//! A cycle reads a batch with `peek_batch`, re-reads every reminder from the
//! store and only removes a job once its reminder is confirmed sent or found
//! stale. Per-job failures are logged and counted; they never abort the
//! batch. The worker keeps no state between cycles apart from the
//! single-flight lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cache::ReadThroughCache;
use crate::channels::DispatcherRegistry;
use crate::config::WorkerConfig;
use crate::models::job::DeliveryJob;
use crate::persistence::db::Database;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::queue::NotificationQueue;
use crate::{AppError, Result};

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CycleReport {
    /// Jobs whose notification was dispatched and marked sent.
    pub processed_count: usize,
    /// Ids of those jobs, in processing order.
    pub job_ids: Vec<String>,
    /// Jobs removed because their reminder was gone or already sent.
    pub stale_removed: usize,
    /// Jobs left queued because their reminder is not yet due.
    pub deferred: usize,
    /// Jobs left queued after a dispatch or store failure.
    pub failed: usize,
    /// Jobs left alone because another worker holds the reminder's claim.
    pub skipped: usize,
    /// The cycle did not run because another cycle was still draining.
    pub busy: bool,
}

impl CycleReport {
    fn busy() -> Self {
        Self {
            busy: true,
            ..Self::default()
        }
    }
}

enum JobOutcome {
    Sent,
    Stale,
    Deferred,
    Skipped,
    Failed,
}

/// Single-flight poll-cycle runner.
#[derive(Clone)]
pub struct NotificationWorker {
    reminders: ReminderRepo,
    tasks: TaskRepo,
    queue: Arc<dyn NotificationQueue>,
    cache: ReadThroughCache,
    dispatchers: DispatcherRegistry,
    batch_size: u32,
    dispatch_timeout: Duration,
    claim_lease: TimeDelta,
    cycle_lock: Arc<Mutex<()>>,
}

impl NotificationWorker {
    /// Build a worker over the store, the queue and the dispatcher table.
    ///
    /// `cache` is the listing cache shared with the task service; an owner's
    /// entry is invalidated whenever one of their reminders is marked sent.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        queue: Arc<dyn NotificationQueue>,
        cache: ReadThroughCache,
        dispatchers: DispatcherRegistry,
        config: &WorkerConfig,
    ) -> Self {
        let claim_lease = TimeDelta::from_std(config.claim_lease())
            .unwrap_or_else(|_| TimeDelta::seconds(30));
        Self {
            reminders: ReminderRepo::new(Arc::clone(&db)),
            tasks: TaskRepo::new(db),
            queue,
            cache,
            dispatchers,
            batch_size: config.batch_size,
            dispatch_timeout: config.dispatch_timeout(),
            claim_lease,
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Override the per-dispatch timeout.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Run one poll cycle as of `now`.
    ///
    /// Returns a report with `busy` set, without touching the queue, if a
    /// cycle is already running on this worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the batch cannot be read. Failures on
    /// individual jobs are counted in the report instead.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            debug!("previous worker cycle still draining, skipping");
            return Ok(CycleReport::busy());
        };

        let span = info_span!("worker_cycle", %now);
        self.drain(now).instrument(span).await
    }

    async fn drain(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let jobs = self.queue.peek_batch(self.batch_size).await?;
        let mut report = CycleReport::default();

        for job in &jobs {
            let outcome = match self.process(job, now).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        job_id = %job.job_id,
                        reminder_id = %job.reminder_id,
                        %err,
                        "job processing failed, job retained"
                    );
                    JobOutcome::Failed
                }
            };
            match outcome {
                JobOutcome::Sent => {
                    report.processed_count += 1;
                    report.job_ids.push(job.job_id.clone());
                }
                JobOutcome::Stale => report.stale_removed += 1,
                JobOutcome::Deferred => report.deferred += 1,
                JobOutcome::Skipped => report.skipped += 1,
                JobOutcome::Failed => report.failed += 1,
            }
        }

        if !jobs.is_empty() {
            info!(
                batch = jobs.len(),
                processed = report.processed_count,
                stale_removed = report.stale_removed,
                deferred = report.deferred,
                failed = report.failed,
                skipped = report.skipped,
                "worker cycle complete"
            );
        }
        Ok(report)
    }

    async fn process(&self, job: &DeliveryJob, now: DateTime<Utc>) -> Result<JobOutcome> {
        let Some(reminder) = self.reminders.get_by_id(&job.reminder_id).await? else {
            debug!(job_id = %job.job_id, "reminder gone, removing job");
            self.queue.remove(job).await?;
            return Ok(JobOutcome::Stale);
        };
        if reminder.sent {
            debug!(reminder_id = %reminder.id, "reminder already sent, removing job");
            self.queue.remove(job).await?;
            return Ok(JobOutcome::Stale);
        }
        if !reminder.is_due(now) {
            return Ok(JobOutcome::Deferred);
        }

        let Some(dispatcher) = self.dispatchers.get(reminder.notify_type) else {
            warn!(
                reminder_id = %reminder.id,
                channel = reminder.notify_type.as_str(),
                "no dispatcher registered for channel"
            );
            return Ok(JobOutcome::Failed);
        };

        // Earlier jobs in the batch may have run long; the lease starts now.
        let claim_at = now.max(Utc::now());
        if !self
            .reminders
            .claim(&reminder.id, claim_at, claim_at + self.claim_lease)
            .await?
        {
            debug!(reminder_id = %reminder.id, "reminder claimed elsewhere");
            return Ok(JobOutcome::Skipped);
        }

        let Some(task) = self.tasks.find_by_id(&reminder.task_id).await? else {
            self.reminders.release_claim(&reminder.id).await?;
            self.queue.remove(job).await?;
            return Ok(JobOutcome::Stale);
        };

        let dispatched = tokio::time::timeout(self.dispatch_timeout, dispatcher.send(&reminder, &task))
            .await
            .unwrap_or_else(|_| {
                Err(AppError::Dispatch(format!(
                    "timed out after {:?}",
                    self.dispatch_timeout
                )))
            });

        if let Err(err) = dispatched {
            warn!(
                reminder_id = %reminder.id,
                channel = reminder.notify_type.as_str(),
                %err,
                "dispatch failed, job retained for retry"
            );
            self.reminders.release_claim(&reminder.id).await?;
            return Ok(JobOutcome::Failed);
        }

        if self.reminders.mark_sent(&reminder.id, Utc::now()).await? {
            self.cache.invalidate(&task.owner_id).await;
        } else {
            debug!(reminder_id = %reminder.id, "reminder was already marked sent");
        }
        self.queue.remove(job).await?;
        info!(
            job_id = %job.job_id,
            reminder_id = %reminder.id,
            channel = reminder.notify_type.as_str(),
            "reminder delivered"
        );
        Ok(JobOutcome::Sent)
    }
}

/// Spawn the background poll loop.
///
/// Cancellation is observed between cycles, so an in-flight cycle always
/// finishes its batch.
#[must_use]
pub fn spawn_worker_task(
    worker: NotificationWorker,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("notification worker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = worker.run_cycle(Utc::now()).await {
                        error!(%err, "worker cycle failed");
                    }
                }
            }
        }
    })
}
