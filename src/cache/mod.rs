//! Per-owner task listing cache.
//!
//! The cache is an optimization only. [`ReadThroughCache`] wraps any
//! [`TaskCache`] backend, swallows its failures (a failing backend behaves
//! as a permanent miss) and guards against filling the cache with a list
//! read before a concurrent invalidation.

pub mod moka_cache;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::models::task::Task;
use crate::Result;

pub use moka_cache::MokaTaskCache;

/// Key-value cache of task lists keyed by owner id.
pub trait TaskCache: Send + Sync {
    /// Cached list for `owner_id`, if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cache`](crate::AppError::Cache) if the backend is unavailable.
    fn get<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<Task>>>> + Send + 'a>>;

    /// Store a list for `owner_id` that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cache`](crate::AppError::Cache) if the backend is unavailable.
    fn put<'a>(
        &'a self,
        owner_id: &'a str,
        tasks: Vec<Task>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Drop the entry for `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cache`](crate::AppError::Cache) if the backend is unavailable.
    fn invalidate<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Backend used when caching is disabled: every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl TaskCache for NoopCache {
    fn get<'a>(
        &'a self,
        _owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<Task>>>> + Send + 'a>> {
        Box::pin(async { Ok(None) })
    }

    fn put<'a>(
        &'a self,
        _owner_id: &'a str,
        _tasks: Vec<Task>,
        _ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn invalidate<'a>(
        &'a self,
        _owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

/// Best-effort read-through front for a [`TaskCache`] backend.
///
/// A single generation counter is bumped by every invalidation, for any
/// owner. A reader captures the generation before reading the store and
/// only fills the cache if no invalidation happened in between. A write for
/// one owner may therefore skip a fill for another; that costs a miss, never
/// a stale entry, and keeps the guard's memory constant.
#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Arc<dyn TaskCache>,
    ttl: Duration,
    generation: Arc<AtomicU64>,
}

impl ReadThroughCache {
    /// Wrap a backend with a fixed fill TTL.
    #[must_use]
    pub fn new(backend: Arc<dyn TaskCache>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A cache that never holds anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCache), Duration::ZERO)
    }

    /// Current invalidation generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Look up a cached list. Backend failures count as a miss.
    pub async fn lookup(&self, owner_id: &str) -> Option<Vec<Task>> {
        match self.backend.get(owner_id).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(owner_id, %err, "task cache unavailable, reading store");
                None
            }
        }
    }

    /// Fill the cache with a list read from the store after observing
    /// `generation`. Skipped if an invalidation happened in between.
    pub async fn fill(&self, owner_id: &str, generation: u64, tasks: Vec<Task>) {
        if self.generation() != generation {
            debug!(owner_id, "skipping cache fill after concurrent write");
            return;
        }
        if let Err(err) = self.backend.put(owner_id, tasks, self.ttl).await {
            warn!(owner_id, %err, "task cache fill failed");
            return;
        }
        // An invalidation may have landed between the check and the put.
        if self.generation() != generation {
            self.evict(owner_id).await;
        }
    }

    /// Invalidate the entry for `owner_id`. Never fails.
    pub async fn invalidate(&self, owner_id: &str) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.evict(owner_id).await;
    }

    async fn evict(&self, owner_id: &str) {
        if let Err(err) = self.backend.invalidate(owner_id).await {
            warn!(owner_id, %err, "task cache invalidation failed");
        }
    }
}
