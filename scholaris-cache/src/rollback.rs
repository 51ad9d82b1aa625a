//! Rollback bookkeeping for optimistic mutations.
//!
//! A [`MutationContext`] is captured from the committed cache state before
//! any optimistic write of its mutation is staged, and is consumed exactly
//! once: restored on error, dropped on success.

use crate::error::CacheResult;
use crate::key::QueryKey;
use crate::mutation::MutationId;
use crate::store::{CacheEntry, CacheTxn, QueryCache};

/// What to do with a target key when its mutation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// Put the captured value back (or remove the key if it was absent).
    #[default]
    Restore,
    /// Leave the key alone. Used for detail entries removed by a delete.
    Discard,
}

#[derive(Debug, Clone)]
struct Snapshot {
    key: QueryKey,
    previous: Option<CacheEntry>,
    policy: RollbackPolicy,
}

/// Per-invocation snapshot of every key a mutation touches.
#[derive(Debug, Clone)]
pub struct MutationContext {
    mutation_id: MutationId,
    name: String,
    snapshots: Vec<Snapshot>,
}

impl MutationContext {
    pub(crate) fn capture<'k>(
        txn: &CacheTxn<'_>,
        mutation_id: MutationId,
        name: &str,
        targets: impl IntoIterator<Item = (&'k QueryKey, RollbackPolicy)>,
    ) -> Self {
        let snapshots = targets
            .into_iter()
            .map(|(key, policy)| Snapshot {
                key: key.clone(),
                previous: txn.get(key).cloned(),
                policy,
            })
            .collect();
        Self {
            mutation_id,
            name: name.to_string(),
            snapshots,
        }
    }

    pub fn mutation_id(&self) -> MutationId {
        self.mutation_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.snapshots.iter().map(|s| &s.key)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The captured entry for `key`.
    ///
    /// `None` if `key` is not a target; `Some(None)` if it was not cached.
    pub fn previous(&self, key: &QueryKey) -> Option<Option<&CacheEntry>> {
        self.snapshots
            .iter()
            .find(|s| &s.key == key)
            .map(|s| s.previous.as_ref())
    }

    pub(crate) fn into_keys(self) -> Vec<QueryKey> {
        self.snapshots.into_iter().map(|s| s.key).collect()
    }

    /// Restore every captured key in one batch.
    ///
    /// Keys that were absent before the mutation are removed again. Returns
    /// the keys that were written or removed.
    pub(crate) fn restore(self, cache: &QueryCache) -> CacheResult<Vec<QueryKey>> {
        cache.transact(move |txn| {
            let mut touched = Vec::with_capacity(self.snapshots.len());
            for snapshot in self.snapshots {
                match (snapshot.policy, snapshot.previous) {
                    (RollbackPolicy::Discard, _) => continue,
                    (RollbackPolicy::Restore, Some(entry)) => {
                        txn.restore(snapshot.key.clone(), entry);
                    }
                    (RollbackPolicy::Restore, None) => {
                        if txn.get(&snapshot.key).is_none() {
                            continue;
                        }
                        txn.remove(snapshot.key.clone());
                    }
                }
                touched.push(snapshot.key);
            }
            Ok(touched)
        })
    }
}
