//! Channel dispatchers: the email, SMS and push providers.
//!
//! Each [`NotifyType`] maps to one [`ChannelDispatcher`] through a
//! [`DispatcherRegistry`] lookup table. Adding a channel means registering
//! another implementation; the worker never branches on the type.

pub mod log;
pub mod webhook;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ChannelsConfig;
use crate::models::reminder::{NotifyType, Reminder};
use crate::models::task::Task;
use crate::Result;

pub use self::log::LogDispatcher;
pub use self::webhook::WebhookDispatcher;

/// A notification provider.
///
/// Delivery is at-least-once: the same reminder may be sent more than once
/// after a crash, so providers should treat `reminder.id` as an idempotency
/// key where they can.
pub trait ChannelDispatcher: Send + Sync {
    /// Deliver a notification for `reminder` on `task`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Dispatch`](crate::AppError::Dispatch) if the
    /// provider rejects or fails the request.
    fn send<'a>(
        &'a self,
        reminder: &'a Reminder,
        task: &'a Task,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Lookup table from notification type to dispatcher.
#[derive(Clone, Default)]
pub struct DispatcherRegistry {
    dispatchers: HashMap<NotifyType, Arc<dyn ChannelDispatcher>>,
}

impl DispatcherRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the dispatcher for `notify_type`.
    pub fn register(&mut self, notify_type: NotifyType, dispatcher: Arc<dyn ChannelDispatcher>) {
        self.dispatchers.insert(notify_type, dispatcher);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, notify_type: NotifyType, dispatcher: Arc<dyn ChannelDispatcher>) -> Self {
        self.register(notify_type, dispatcher);
        self
    }

    /// Dispatcher for `notify_type`, if one is registered.
    #[must_use]
    pub fn get(&self, notify_type: NotifyType) -> Option<Arc<dyn ChannelDispatcher>> {
        self.dispatchers.get(&notify_type).cloned()
    }

    /// Build dispatchers from channel configuration.
    ///
    /// `log_only` wins over an endpoint. A channel with neither is left
    /// unregistered, so its jobs fail dispatch and stay queued.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an HTTP client cannot be built.
    pub fn from_config(channels: &ChannelsConfig, request_timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();
        for notify_type in NotifyType::ALL {
            let channel = channels.get(notify_type);
            if !channel.is_configured() {
                warn!(
                    channel = notify_type.as_str(),
                    "channel not configured; its reminders will stay queued"
                );
                continue;
            }
            match &channel.endpoint {
                Some(endpoint) if !channel.log_only => {
                    let dispatcher = WebhookDispatcher::new(
                        notify_type,
                        endpoint.clone(),
                        channel.api_key.clone(),
                        request_timeout,
                    )?;
                    registry.register(notify_type, Arc::new(dispatcher));
                    info!(channel = notify_type.as_str(), endpoint, "webhook dispatcher registered");
                }
                _ => {
                    registry.register(notify_type, Arc::new(LogDispatcher::new(notify_type)));
                    info!(channel = notify_type.as_str(), "log-only dispatcher registered");
                }
            }
        }
        Ok(registry)
    }
}
