//! Query client: the read/refetch side of the cache and the entry point for
//! optimistic mutations.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{CacheError, CacheResult, MutationError};
use crate::freshness::{CacheRead, Freshness};
use crate::key::QueryKey;
use crate::mutation::{Mutation, MutationRegistry, PendingMutation, PendingMutationInfo, ServerAck};
use crate::store::{CacheEvent, CacheStats, FetchTicket, QueryCache};

/// Configuration for the query client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a server write stays fresh.
    pub stale_time: Duration,
    /// Whether invalidation schedules background refetches.
    pub refetch_on_invalidate: bool,
    /// Capacity of the change-event channel.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(60),
            refetch_on_invalidate: true,
            event_capacity: 256,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fresh window of server writes.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Enable or disable background refetch after invalidation.
    pub fn with_refetch_on_invalidate(mut self, enabled: bool) -> Self {
        self.refetch_on_invalidate = enabled;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Loads the server value for a key.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> CacheResult<Value>;
}

struct ClientInner {
    cache: QueryCache,
    config: CacheConfig,
    fetchers: RwLock<Vec<(QueryKey, Arc<dyn QueryFetcher>)>>,
    registry: MutationRegistry,
}

/// Shared handle to the process-wide cache. Cloning is cheap.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                cache: QueryCache::new(config.stale_time, config.event_capacity),
                config,
                fetchers: RwLock::new(Vec::new()),
                registry: MutationRegistry::new(),
            }),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub(crate) fn registry(&self) -> &MutationRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.cache.subscribe()
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.inner.cache.stats()
    }

    // ------------------------------------------------------------------------
    // Fetchers
    // ------------------------------------------------------------------------

    /// Register the fetcher used for every key under `pattern`.
    ///
    /// When several patterns match a key the longest one wins. Registering the
    /// same pattern again replaces the previous fetcher.
    pub fn register_fetcher(&self, pattern: QueryKey, fetcher: Arc<dyn QueryFetcher>) -> CacheResult<()> {
        let mut fetchers = self.inner.fetchers.write()?;
        match fetchers.iter_mut().find(|(p, _)| *p == pattern) {
            Some(slot) => slot.1 = fetcher,
            None => fetchers.push((pattern, fetcher)),
        }
        Ok(())
    }

    fn fetcher_for(&self, key: &QueryKey) -> CacheResult<Option<Arc<dyn QueryFetcher>>> {
        Ok(self
            .inner
            .fetchers
            .read()?
            .iter()
            .filter(|(pattern, _)| QueryKey::matches(pattern, key))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, fetcher)| Arc::clone(fetcher)))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read `key` with the registered fetcher.
    pub async fn fetch_query<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
        freshness: Freshness,
    ) -> CacheResult<CacheRead<T>> {
        let fetcher = self.fetcher_for(key)?.ok_or_else(|| CacheError::Fetch {
            key: key.clone(),
            reason: "no fetcher registered".to_string(),
        })?;
        self.fetch_query_with(key, freshness, fetcher.as_ref()).await
    }

    /// Read `key`, fetching through `fetcher` unless the cached value
    /// satisfies `freshness`.
    ///
    /// While a mutation targeting `key` is pending the optimistic value is
    /// served as-is.
    pub async fn fetch_query_with<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
        freshness: Freshness,
        fetcher: &dyn QueryFetcher,
    ) -> CacheResult<CacheRead<T>> {
        let cache = &self.inner.cache;

        if let Some(entry) = cache.get(key)? {
            let usable = self.inner.registry.is_key_pending(key)?
                || match &freshness {
                    Freshness::Fresh => entry.is_fresh_at(Utc::now()),
                    Freshness::MaxAge { max_age } => {
                        entry.is_authoritative() && entry.age() <= *max_age
                    }
                    Freshness::StaleWhileRevalidate => true,
                };
            if usable {
                cache.record_hit();
                if freshness.accepts_stale() && entry.is_stale() {
                    self.schedule_refetch(key)?;
                }
                return entry.to_read(key);
            }
        }

        cache.record_miss();
        let ticket = cache.begin_fetch(key)?;
        let value = fetcher.fetch(key).await?;
        let decoded: T = serde_json::from_value(value.clone()).map_err(|e| CacheError::Decode {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        if !cache.complete_fetch(&ticket, value)? {
            // A mutation started while we were fetching; its value wins.
            if let Some(read) = cache.read::<T>(key)? {
                return Ok(read);
            }
        }
        Ok(CacheRead::from_fetch(decoded))
    }

    /// Whatever is cached for `key`, without fetching.
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<Option<T>> {
        self.inner.cache.value(key)
    }

    /// Seed `key` with a server value.
    pub fn set_query_data<T: Serialize>(&self, key: QueryKey, value: &T) -> CacheResult<()> {
        self.inner.cache.put(key, value)
    }

    // ------------------------------------------------------------------------
    // Invalidation and refetch
    // ------------------------------------------------------------------------

    /// Mark everything under `pattern` stale and refetch it in the background.
    pub fn invalidate(&self, pattern: &QueryKey) -> CacheResult<Vec<QueryKey>> {
        let marked = self.inner.cache.invalidate_matching(pattern, &HashSet::new())?;
        if self.inner.config.refetch_on_invalidate {
            for key in &marked {
                self.schedule_refetch(key)?;
            }
        }
        Ok(marked)
    }

    /// Settle-time invalidation. Never fails; problems are logged.
    ///
    /// Everything under `targets` except `confirmed` is marked stale, and
    /// everything under `related` without exception.
    pub(crate) fn invalidate_patterns(
        &self,
        targets: &[QueryKey],
        confirmed: &HashSet<QueryKey>,
        related: &[QueryKey],
    ) {
        let unshielded = HashSet::new();
        let passes = targets
            .iter()
            .map(|pattern| (pattern, confirmed))
            .chain(related.iter().map(|pattern| (pattern, &unshielded)));
        let mut marked = HashSet::new();
        for (pattern, exclude) in passes {
            match self.inner.cache.invalidate_matching(pattern, exclude) {
                Ok(keys) => marked.extend(keys),
                Err(e) => {
                    tracing::error!(key = %pattern, error = %e, "Invalidation failed");
                }
            }
        }
        if !self.inner.config.refetch_on_invalidate {
            return;
        }
        for key in &marked {
            if let Err(e) = self.schedule_refetch(key) {
                tracing::warn!(key = %key, error = %e, "Failed to schedule refetch");
            }
        }
    }

    /// Remove everything under `pattern`, cancelling in-flight fetches.
    pub fn remove(&self, pattern: &QueryKey) -> CacheResult<Vec<QueryKey>> {
        for key in self.inner.cache.keys_matching(pattern)? {
            self.inner.cache.cancel_fetches(&key)?;
        }
        self.inner.cache.remove_matching(pattern)
    }

    /// Schedule a background refetch of `key` now.
    pub fn refetch(&self, key: &QueryKey) -> CacheResult<bool> {
        self.schedule_refetch(key)
    }

    /// Spawn a background refetch of `key` on the current tokio runtime.
    ///
    /// Returns false when nothing was scheduled: a mutation on `key` is
    /// pending, no fetcher matches, a refetch is already running, or there is
    /// no runtime.
    fn schedule_refetch(&self, key: &QueryKey) -> CacheResult<bool> {
        let cache = &self.inner.cache;
        if self.inner.registry.is_key_pending(key)? {
            return Ok(false);
        }
        let Some(fetcher) = self.fetcher_for(key)? else {
            return Ok(false);
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(key = %key, "No runtime, skipping background refetch");
            return Ok(false);
        };
        let Some(ticket) = cache.begin_background_fetch(key)? else {
            return Ok(false);
        };

        cache.notify(CacheEvent::RefetchScheduled { key: key.clone() });
        let client = self.clone();
        let task_ticket = ticket.clone();
        let task = runtime.spawn(async move {
            client.run_background_fetch(task_ticket, fetcher).await;
        });
        cache.attach_abort_handle(&ticket, task.abort_handle())?;
        tracing::trace!(key = %key, "Scheduled background refetch");
        Ok(true)
    }

    async fn run_background_fetch(&self, ticket: FetchTicket, fetcher: Arc<dyn QueryFetcher>) {
        let cache = &self.inner.cache;
        match fetcher.fetch(ticket.key()).await {
            Ok(value) => {
                if let Err(e) = cache.complete_fetch(&ticket, value) {
                    tracing::warn!(key = %ticket.key(), error = %e, "Failed to store refetch result");
                }
            }
            Err(e) => {
                tracing::warn!(key = %ticket.key(), error = %e, "Background refetch failed");
            }
        }
        if let Err(e) = cache.finish_background_fetch(&ticket) {
            tracing::warn!(key = %ticket.key(), error = %e, "Failed to clear refetch bookkeeping");
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Apply `mutation` optimistically. See [`PendingMutation::begin`].
    pub fn begin_mutation(&self, mutation: Mutation) -> CacheResult<PendingMutation> {
        PendingMutation::begin(self, mutation)
    }

    /// Run the full protocol around `server_call`.
    ///
    /// `server_call` is not polled until the optimistic writes are visible.
    pub async fn mutate<Fut>(&self, mutation: Mutation, server_call: Fut) -> Result<ServerAck, MutationError>
    where
        Fut: Future<Output = Result<ServerAck, MutationError>>,
    {
        self.begin_mutation(mutation)?.run(server_call).await
    }

    /// Unsettled mutations in start order.
    pub fn pending_mutations(&self) -> CacheResult<Vec<PendingMutationInfo>> {
        self.inner.registry.snapshot()
    }

    /// Pending flag for views: is any unsettled mutation touching `pattern`?
    pub fn is_mutating(&self, pattern: &QueryKey) -> CacheResult<bool> {
        self.inner.registry.is_mutating(pattern)
    }
}
