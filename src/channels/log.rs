//! Log-only dispatcher for development setups without a provider.

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use super::ChannelDispatcher;
use crate::models::reminder::{NotifyType, Reminder};
use crate::models::task::Task;
use crate::notification::Notification;
use crate::Result;

/// Writes each notification to the log and reports success.
#[derive(Debug, Clone, Copy)]
pub struct LogDispatcher {
    notify_type: NotifyType,
}

impl LogDispatcher {
    /// Dispatcher for `notify_type`.
    #[must_use]
    pub fn new(notify_type: NotifyType) -> Self {
        Self { notify_type }
    }
}

impl ChannelDispatcher for LogDispatcher {
    fn send<'a>(
        &'a self,
        reminder: &'a Reminder,
        task: &'a Task,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let notification = Notification::render(reminder, task)?;
            info!(
                channel = self.notify_type.as_str(),
                reminder_id = %notification.reminder_id,
                owner_id = %notification.owner_id,
                subject = %notification.subject,
                due = %notification.due_origin,
                "notification (log only)"
            );
            Ok(())
        })
    }
}
