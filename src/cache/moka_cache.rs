//! In-process task cache backed by [`moka`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

use super::TaskCache;
use crate::models::task::Task;
use crate::Result;

#[derive(Clone)]
struct CachedTasks {
    tasks: Arc<Vec<Task>>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, CachedTasks> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedTasks,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedTasks,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded, TTL-expiring cache of task lists.
#[derive(Clone)]
pub struct MokaTaskCache {
    cache: Cache<String, CachedTasks>,
}

impl MokaTaskCache {
    /// Create a cache holding at most `max_entries` owners.
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl TaskCache for MokaTaskCache {
    fn get<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<Task>>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .cache
                .get(owner_id)
                .await
                .map(|entry| entry.tasks.as_ref().clone()))
        })
    }

    fn put<'a>(
        &'a self,
        owner_id: &'a str,
        tasks: Vec<Task>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let entry = CachedTasks {
                tasks: Arc::new(tasks),
                ttl,
            };
            self.cache.insert(owner_id.to_owned(), entry).await;
            Ok(())
        })
    }

    fn invalidate<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.cache.invalidate(owner_id).await;
            Ok(())
        })
    }
}
