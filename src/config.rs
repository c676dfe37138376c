//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::reminder::NotifyType;
use crate::{AppError, Result};

/// Keychain service name under which channel API keys are stored.
pub const KEYRING_SERVICE: &str = "reminder-scheduler";

/// Notification worker settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Maximum number of queued jobs read per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Upper bound on a single dispatcher call.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_seconds: u64,
    /// How long a worker holds exclusive dispatch rights on a reminder.
    #[serde(default = "default_claim_lease")]
    pub claim_lease_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            batch_size: default_batch_size(),
            dispatch_timeout_seconds: default_dispatch_timeout(),
            claim_lease_seconds: default_claim_lease(),
        }
    }
}

impl WorkerConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Dispatch timeout as a [`Duration`].
    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }

    /// Claim lease as a [`Duration`].
    #[must_use]
    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_seconds)
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    50
}

fn default_dispatch_timeout() -> u64 {
    10
}

fn default_claim_lease() -> u64 {
    30
}

/// Task listing cache settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Whether the read-through cache is used at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lifetime of a cached task list.
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached owners.
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl CacheConfig {
    /// Cache TTL as a [`Duration`].
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_entries() -> u64 {
    10_000
}

/// Reconciliation sweep settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReconciliationConfig {
    /// Seconds between sweeps; 0 disables the background sweep.
    #[serde(default = "default_reconcile_interval")]
    pub interval_seconds: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_reconcile_interval(),
        }
    }
}

fn default_reconcile_interval() -> u64 {
    300
}

/// Settings for one notification channel provider.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    /// HTTP endpoint of the provider.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Log notifications instead of sending them.
    #[serde(default)]
    pub log_only: bool,
    /// Provider API key (populated at runtime, never read from TOML).
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl ChannelConfig {
    /// Whether a dispatcher can be built from this configuration.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.log_only || self.endpoint.is_some()
    }
}

/// Per-channel provider configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelsConfig {
    /// Email provider.
    #[serde(default)]
    pub email: ChannelConfig,
    /// SMS provider.
    #[serde(default)]
    pub sms: ChannelConfig,
    /// Push provider.
    #[serde(default)]
    pub push: ChannelConfig,
}

impl ChannelsConfig {
    /// Configuration for the given notification type.
    #[must_use]
    pub fn get(&self, notify_type: NotifyType) -> &ChannelConfig {
        match notify_type {
            NotifyType::Email => &self.email,
            NotifyType::Sms => &self.sms,
            NotifyType::Push => &self.push,
        }
    }

    fn get_mut(&mut self, notify_type: NotifyType) -> &mut ChannelConfig {
        match notify_type {
            NotifyType::Email => &mut self.email,
            NotifyType::Sms => &mut self.sms,
            NotifyType::Push => &mut self.push,
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file backing the task store and the queue.
    pub database_path: PathBuf,
    /// Port for the HTTP surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Notification worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Task listing cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Reconciliation sweep settings.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Channel provider settings.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load channel API keys from OS keychain with env-var fallback.
    ///
    /// Only channels with an HTTP endpoint need a key. A missing key is not
    /// fatal: the provider is called without an authorization header.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain worker task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        for notify_type in NotifyType::ALL {
            if self.channels.get(notify_type).endpoint.is_none() {
                continue;
            }
            let keyring_key = format!("{}_api_key", notify_type.as_str());
            let env_key = keyring_key.to_uppercase();
            let key = load_credential(&keyring_key, &env_key).await?;
            if key.is_none() {
                warn!(channel = notify_type.as_str(), "no api key found for channel");
            }
            self.channels.get_mut(notify_type).api_key = key;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.worker.batch_size == 0 {
            return Err(AppError::Config("worker.batch_size must be greater than zero".into()));
        }
        if self.worker.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "worker.poll_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.worker.dispatch_timeout_seconds == 0 {
            return Err(AppError::Config(
                "worker.dispatch_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.worker.claim_lease_seconds <= self.worker.dispatch_timeout_seconds {
            return Err(AppError::Config(
                "worker.claim_lease_seconds must exceed worker.dispatch_timeout_seconds".into(),
            ));
        }
        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return Err(AppError::Config("cache.ttl_seconds must be greater than zero".into()));
        }
        for notify_type in NotifyType::ALL {
            if let Some(endpoint) = &self.channels.get(notify_type).endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(AppError::Config(format!(
                        "channels.{}.endpoint must be an http(s) url",
                        notify_type.as_str()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}
