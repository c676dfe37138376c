//! Reconciliation sweep for persisted-but-unqueued reminders.
//!
//! An enqueue that fails after the reminder row committed leaves a reminder
//! nobody will deliver. The sweep re-enqueues every unsent reminder that is
//! already due and has no job in the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::persistence::db::Database;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::queue::NotificationQueue;
use crate::scheduler::ReminderScheduler;
use crate::Result;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SweepReport {
    /// Unsent, due reminders examined.
    pub examined: usize,
    /// Reminders that had no queued job and were re-enqueued.
    pub requeued: usize,
}

/// Finds orphaned reminders and pushes fresh jobs for them.
#[derive(Clone)]
pub struct Reconciler {
    reminders: ReminderRepo,
    queue: Arc<dyn NotificationQueue>,
    scheduler: ReminderScheduler,
}

impl Reconciler {
    /// Build a reconciler. `scheduler` is used for the actual enqueue.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        queue: Arc<dyn NotificationQueue>,
        scheduler: ReminderScheduler,
    ) -> Self {
        Self {
            reminders: ReminderRepo::new(db),
            queue,
            scheduler,
        }
    }

    /// Run one sweep as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` or `AppError::Queue` if either side cannot
    /// be read. Individual push failures are left for the next sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.reminders.list_unsent_due(now).await?;
        let queued = self.queue.queued_reminder_ids().await?;

        let orphans: Vec<_> = due
            .iter()
            .filter(|reminder| !queued.contains(&reminder.id))
            .cloned()
            .collect();
        let requeued = if orphans.is_empty() {
            0
        } else {
            self.scheduler.enqueue(&orphans).await
        };

        if requeued > 0 {
            info!(requeued, examined = due.len(), "reconciliation re-enqueued reminders");
        }
        Ok(SweepReport {
            examined: due.len(),
            requeued,
        })
    }
}

/// Spawn the periodic reconciliation sweep.
#[must_use]
pub fn spawn_reconciliation_task(
    reconciler: Reconciler,
    sweep_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("reconciliation task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = reconciler.sweep(Utc::now()).await {
                        error!(%err, "reconciliation sweep failed");
                    }
                }
            }
        }
    })
}
