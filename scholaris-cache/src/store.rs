//! Normalized in-memory query cache.
//!
//! Entries live in an ordered map keyed by [`QueryKey`], so prefix
//! invalidation is a range scan. The map sits behind a `std::sync::RwLock`
//! that is only ever held for synchronous sections: optimistic writes are
//! visible to the next reader before any network call is polled.
//!
//! Each key also carries a fetch epoch. A fetch captures the epoch in a
//! [`FetchTicket`] when it starts and may only write back if the epoch is
//! unchanged; [`QueryCache::cancel_fetches`] bumps it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::error::{CacheError, CacheResult};
use crate::freshness::CacheRead;
use crate::key::QueryKey;

/// Where the current value of an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrySource {
    /// Written from a server response or a completed fetch.
    Server,
    /// Written by a pending mutation before the server answered.
    Optimistic,
    /// Restored from a mutation snapshot after the server call failed.
    Rollback,
}

/// A cached value with its freshness bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub source: EntrySource,
    pub updated_at: DateTime<Utc>,
    pub fresh_until: DateTime<Utc>,
    /// Set by invalidation; cleared by the next server write.
    pub invalidated: bool,
}

impl CacheEntry {
    fn new(value: Value, source: EntrySource, stale_time: Duration) -> Self {
        let now = Utc::now();
        let fresh_until = match source {
            EntrySource::Server => {
                now + chrono::Duration::from_std(stale_time).unwrap_or(chrono::Duration::zero())
            }
            EntrySource::Optimistic | EntrySource::Rollback => now,
        };
        Self {
            value,
            source,
            updated_at: now,
            fresh_until,
            invalidated: false,
        }
    }

    /// Server-confirmed and not invalidated.
    pub fn is_authoritative(&self) -> bool {
        self.source == EntrySource::Server && !self.invalidated
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.is_authoritative() && now < self.fresh_until
    }

    pub fn is_stale(&self) -> bool {
        !self.is_fresh_at(Utc::now())
    }

    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Decode the JSON value into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| CacheError::Decode {
            key: key.clone(),
            reason: e.to_string(),
        })
    }

    pub(crate) fn to_read<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<CacheRead<T>> {
        Ok(CacheRead::from_cache(
            self.decode(key)?,
            self.updated_at,
            self.source,
            self.is_stale(),
        ))
    }
}

/// Change notifications, the re-render signal for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated { key: QueryKey, source: EntrySource },
    Removed { key: QueryKey },
    Invalidated { key: QueryKey },
    RefetchScheduled { key: QueryKey },
    FetchCancelled { key: QueryKey },
    FetchDiscarded { key: QueryKey },
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Updated { key, .. }
            | CacheEvent::Removed { key }
            | CacheEvent::Invalidated { key }
            | CacheEvent::RefetchScheduled { key }
            | CacheEvent::FetchCancelled { key }
            | CacheEvent::FetchDiscarded { key } => key,
        }
    }
}

/// Proof that a fetch was started at a given epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: QueryKey,
    epoch: u64,
    fetch_id: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads that had to fetch.
    pub misses: u64,
    /// Number of entries currently cached.
    pub entry_count: u64,
    /// Fetch results dropped because their ticket was cancelled.
    pub discarded_fetches: u64,
    /// Mutations that were rolled back.
    pub rollbacks: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct InFlight {
    fetch_id: u64,
    abort: Option<AbortHandle>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<QueryKey, CacheEntry>,
    epochs: HashMap<QueryKey, u64>,
    background: HashMap<QueryKey, InFlight>,
}

impl CacheState {
    fn epoch(&self, key: &QueryKey) -> u64 {
        self.epochs.get(key).copied().unwrap_or(0)
    }

    fn matching_keys(&self, pattern: &QueryKey) -> Vec<QueryKey> {
        self.entries
            .range((Bound::Included(pattern.clone()), Bound::Unbounded))
            .take_while(|(key, _)| QueryKey::matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

enum StagedOp {
    Put {
        key: QueryKey,
        value: Value,
        source: EntrySource,
    },
    Restore {
        key: QueryKey,
        entry: CacheEntry,
    },
    Remove {
        key: QueryKey,
    },
}

/// Staged multi-key write.
///
/// Reads see the committed state. Writes are buffered and applied together
/// only if the closure passed to [`QueryCache::transact`] returns `Ok`, so
/// observers never see a partial batch.
pub(crate) struct CacheTxn<'a> {
    state: &'a CacheState,
    staged: Vec<StagedOp>,
}

impl<'a> CacheTxn<'a> {
    pub(crate) fn get(&self, key: &QueryKey) -> Option<&'a CacheEntry> {
        self.state.entries.get(key)
    }

    pub(crate) fn put(&mut self, key: QueryKey, value: Value, source: EntrySource) {
        self.staged.push(StagedOp::Put { key, value, source });
    }

    pub(crate) fn restore(&mut self, key: QueryKey, mut entry: CacheEntry) {
        entry.source = EntrySource::Rollback;
        self.staged.push(StagedOp::Restore { key, entry });
    }

    pub(crate) fn remove(&mut self, key: QueryKey) {
        self.staged.push(StagedOp::Remove { key });
    }
}

/// Process-wide query cache.
#[derive(Debug)]
pub struct QueryCache {
    state: RwLock<CacheState>,
    events: broadcast::Sender<CacheEvent>,
    stale_time: Duration,
    next_fetch_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    discarded_fetches: AtomicU64,
    rollbacks: AtomicU64,
}

impl QueryCache {
    /// Create a cache whose server writes stay fresh for `stale_time`.
    pub fn new(stale_time: Duration, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: RwLock::new(CacheState::default()),
            events,
            stale_time,
            next_fetch_id: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            discarded_fetches: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub(crate) fn notify(&self, event: CacheEvent) {
        self.emit(vec![event]);
    }

    fn emit(&self, events: Vec<CacheEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn get(&self, key: &QueryKey) -> CacheResult<Option<CacheEntry>> {
        Ok(self.state.read()?.entries.get(key).cloned())
    }

    /// Typed read of whatever is cached, fresh or not.
    pub fn read<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<Option<CacheRead<T>>> {
        match self.get(key)? {
            Some(entry) => Ok(Some(entry.to_read(key)?)),
            None => Ok(None),
        }
    }

    /// Typed read of just the value.
    pub fn value<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<Option<T>> {
        Ok(self.read(key)?.map(CacheRead::into_value))
    }

    pub fn contains(&self, key: &QueryKey) -> CacheResult<bool> {
        Ok(self.state.read()?.entries.contains_key(key))
    }

    pub fn len(&self) -> CacheResult<usize> {
        Ok(self.state.read()?.entries.len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every cached key under `pattern`, in key order.
    pub fn keys_matching(&self, pattern: &QueryKey) -> CacheResult<Vec<QueryKey>> {
        Ok(self.state.read()?.matching_keys(pattern))
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write an authoritative server value; it becomes fresh.
    pub fn put_value(&self, key: QueryKey, value: Value) -> CacheResult<()> {
        self.transact(|txn| {
            txn.put(key, value, EntrySource::Server);
            Ok(())
        })
    }

    /// Typed variant of [`QueryCache::put_value`].
    pub fn put<T: Serialize>(&self, key: QueryKey, value: &T) -> CacheResult<()> {
        let value = serde_json::to_value(value).map_err(|e| CacheError::Encode {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.put_value(key, value)
    }

    pub fn remove(&self, key: &QueryKey) -> CacheResult<Option<CacheEntry>> {
        let removed = self.state.write()?.entries.remove(key);
        if removed.is_some() {
            self.emit(vec![CacheEvent::Removed { key: key.clone() }]);
        }
        Ok(removed)
    }

    /// Remove every entry under `pattern`.
    pub fn remove_matching(&self, pattern: &QueryKey) -> CacheResult<Vec<QueryKey>> {
        let removed = {
            let mut state = self.state.write()?;
            let keys = state.matching_keys(pattern);
            for key in &keys {
                state.entries.remove(key);
            }
            keys
        };
        self.emit(
            removed
                .iter()
                .map(|key| CacheEvent::Removed { key: key.clone() })
                .collect(),
        );
        Ok(removed)
    }

    /// Mark every entry under `pattern` stale, skipping `exclude`.
    ///
    /// Returns the keys that were marked.
    pub fn invalidate_matching(
        &self,
        pattern: &QueryKey,
        exclude: &HashSet<QueryKey>,
    ) -> CacheResult<Vec<QueryKey>> {
        let marked = {
            let mut state = self.state.write()?;
            let keys: Vec<QueryKey> = state
                .matching_keys(pattern)
                .into_iter()
                .filter(|key| !exclude.contains(key))
                .collect();
            for key in &keys {
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.invalidated = true;
                }
            }
            keys
        };
        self.emit(
            marked
                .iter()
                .map(|key| CacheEvent::Invalidated { key: key.clone() })
                .collect(),
        );
        Ok(marked)
    }

    /// Run a staged multi-key write under a single lock acquisition.
    pub(crate) fn transact<R, F>(&self, f: F) -> CacheResult<R>
    where
        F: FnOnce(&mut CacheTxn<'_>) -> CacheResult<R>,
    {
        let mut state = self.state.write()?;
        let (result, staged) = {
            let mut txn = CacheTxn {
                state: &state,
                staged: Vec::new(),
            };
            let result = f(&mut txn)?;
            (result, txn.staged)
        };

        let mut events = Vec::with_capacity(staged.len());
        for op in staged {
            match op {
                StagedOp::Put { key, value, source } => {
                    state
                        .entries
                        .insert(key.clone(), CacheEntry::new(value, source, self.stale_time));
                    events.push(CacheEvent::Updated { key, source });
                }
                StagedOp::Restore { key, entry } => {
                    let source = entry.source;
                    state.entries.insert(key.clone(), entry);
                    events.push(CacheEvent::Updated { key, source });
                }
                StagedOp::Remove { key } => {
                    if state.entries.remove(&key).is_some() {
                        events.push(CacheEvent::Removed { key });
                    }
                }
            }
        }
        drop(state);
        self.emit(events);
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Fetch coordination
    // ------------------------------------------------------------------------

    /// Start a foreground fetch of `key`.
    pub fn begin_fetch(&self, key: &QueryKey) -> CacheResult<FetchTicket> {
        let state = self.state.read()?;
        Ok(FetchTicket {
            key: key.clone(),
            epoch: state.epoch(key),
            fetch_id: self.next_fetch_id.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Start a background refetch of `key`, unless one is already running.
    pub fn begin_background_fetch(&self, key: &QueryKey) -> CacheResult<Option<FetchTicket>> {
        let mut state = self.state.write()?;
        if state.background.contains_key(key) {
            return Ok(None);
        }
        let ticket = FetchTicket {
            key: key.clone(),
            epoch: state.epoch(key),
            fetch_id: self.next_fetch_id.fetch_add(1, Ordering::Relaxed),
        };
        state.background.insert(
            key.clone(),
            InFlight {
                fetch_id: ticket.fetch_id,
                abort: None,
            },
        );
        Ok(Some(ticket))
    }

    /// Attach the task handle of a background refetch so it can be aborted.
    pub fn attach_abort_handle(&self, ticket: &FetchTicket, handle: AbortHandle) -> CacheResult<()> {
        let mut state = self.state.write()?;
        match state.background.get_mut(&ticket.key) {
            Some(in_flight) if in_flight.fetch_id == ticket.fetch_id => {
                in_flight.abort = Some(handle);
            }
            // Already finished or cancelled.
            _ => handle.abort(),
        }
        Ok(())
    }

    /// Forget a background refetch once its task is done.
    pub fn finish_background_fetch(&self, ticket: &FetchTicket) -> CacheResult<()> {
        let mut state = self.state.write()?;
        if state
            .background
            .get(&ticket.key)
            .map(|in_flight| in_flight.fetch_id == ticket.fetch_id)
            .unwrap_or(false)
        {
            state.background.remove(&ticket.key);
        }
        Ok(())
    }

    pub fn background_fetch_in_flight(&self, key: &QueryKey) -> CacheResult<bool> {
        Ok(self.state.read()?.background.contains_key(key))
    }

    /// Write a fetch result if its ticket is still current.
    ///
    /// Returns `false` (and writes nothing) when the key's epoch moved on
    /// since the fetch started.
    pub fn complete_fetch(&self, ticket: &FetchTicket, value: Value) -> CacheResult<bool> {
        let accepted = {
            let mut state = self.state.write()?;
            if state.epoch(&ticket.key) == ticket.epoch {
                state.entries.insert(
                    ticket.key.clone(),
                    CacheEntry::new(value, EntrySource::Server, self.stale_time),
                );
                true
            } else {
                false
            }
        };
        if accepted {
            self.emit(vec![CacheEvent::Updated {
                key: ticket.key.clone(),
                source: EntrySource::Server,
            }]);
        } else {
            self.discarded_fetches.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %ticket.key, "Discarding result of cancelled fetch");
            self.emit(vec![CacheEvent::FetchDiscarded {
                key: ticket.key.clone(),
            }]);
        }
        Ok(accepted)
    }

    /// Make every in-flight fetch of `key` obsolete.
    ///
    /// Bumps the key's epoch so no outstanding ticket can write back, and
    /// aborts the background refetch task if there is one. Returns true if a
    /// background refetch was running.
    pub fn cancel_fetches(&self, key: &QueryKey) -> CacheResult<bool> {
        let in_flight = {
            let mut state = self.state.write()?;
            *state.epochs.entry(key.clone()).or_insert(0) += 1;
            state.background.remove(key)
        };
        let had_background = in_flight.is_some();
        if let Some(InFlight {
            abort: Some(handle),
            ..
        }) = in_flight
        {
            handle.abort();
        }
        if had_background {
            self.emit(vec![CacheEvent::FetchCancelled { key: key.clone() }]);
        }
        Ok(had_background)
    }

    // ------------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------------

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len()? as u64,
            discarded_fetches: self.discarded_fetches.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        })
    }
}
