//! HTTP provider dispatcher.
//!
//! POSTs the rendered [`Notification`] as JSON to the configured endpoint.
//! Any non-2xx response is a dispatch failure.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use super::ChannelDispatcher;
use crate::models::reminder::{NotifyType, Reminder};
use crate::models::task::Task;
use crate::notification::Notification;
use crate::{AppError, Result};

/// Header carrying the reminder id so providers can de-duplicate.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Dispatcher that delivers through an HTTP provider endpoint.
#[derive(Clone)]
pub struct WebhookDispatcher {
    notify_type: NotifyType,
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl WebhookDispatcher {
    /// Build a dispatcher for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(
        notify_type: NotifyType,
        endpoint: String,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            notify_type,
            endpoint,
            api_key,
            http,
        })
    }

    /// Channel this dispatcher serves.
    #[must_use]
    pub fn notify_type(&self) -> NotifyType {
        self.notify_type
    }

    async fn post(&self, reminder: &Reminder, task: &Task) -> Result<()> {
        let notification = Notification::render(reminder, task)?;

        let mut request = self
            .http
            .post(&self.endpoint)
            .header(IDEMPOTENCY_HEADER, &reminder.id)
            .json(&notification);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            AppError::Dispatch(format!("{} request failed: {err}", self.notify_type.as_str()))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Dispatch(format!(
                "{} provider returned {status}",
                self.notify_type.as_str()
            )));
        }

        debug!(
            reminder_id = %reminder.id,
            channel = self.notify_type.as_str(),
            %status,
            "provider accepted notification"
        );
        Ok(())
    }
}

impl ChannelDispatcher for WebhookDispatcher {
    fn send<'a>(
        &'a self,
        reminder: &'a Reminder,
        task: &'a Task,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.post(reminder, task))
    }
}
