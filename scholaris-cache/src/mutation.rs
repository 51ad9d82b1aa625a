//! Optimistic mutation protocol.
//!
//! A [`Mutation`] names the keys it touches, how each one changes before the
//! server answers, and how each one absorbs the server's canonical entity.
//! [`PendingMutation::begin`] performs the synchronous half:
//!
//! 1. cancel in-flight refetches of every target key,
//! 2. snapshot every target key,
//! 3. stage and commit every optimistic write in one batch.
//!
//! The caller then awaits the server call and settles the pending mutation
//! with [`PendingMutation::succeed`] or [`PendingMutation::fail`], or lets
//! [`PendingMutation::run`] do both. Settling consumes the pending mutation,
//! so a second settle of the same invocation does not compile. Either way the
//! target keys and any extra patterns are invalidated afterwards.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::client::QueryClient;
use crate::error::{CacheError, CacheResult, MutationError};
use crate::key::QueryKey;
use crate::rollback::{MutationContext, RollbackPolicy};
use crate::state::{MutationObserver, MutationState, MutationTracker};
use crate::store::EntrySource;

/// Identifier of one mutation invocation. UUIDv7, so ids sort in start order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the server call resolved with.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerAck {
    /// The canonical entity after the mutation.
    Entity(Value),
    /// A bare success flag.
    Acknowledged,
}

impl ServerAck {
    pub fn entity<T: Serialize>(entity: &T) -> Result<Self, MutationError> {
        serde_json::to_value(entity)
            .map(ServerAck::Entity)
            .map_err(|e| MutationError::malformed(e.to_string()))
    }

    pub fn entity_value(&self) -> Option<&Value> {
        match self {
            ServerAck::Entity(value) => Some(value),
            ServerAck::Acknowledged => None,
        }
    }

    /// Decode the canonical entity.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, MutationError> {
        self.entity_value()
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(|e| MutationError::malformed(e.to_string()))
    }
}

/// The optimistic change an updater wants for its key.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimisticWrite {
    Set(Value),
    Remove,
    Unchanged,
}

type Updater = Box<dyn FnOnce(Option<&Value>) -> CacheResult<OptimisticWrite> + Send>;
type Reconciler = Box<dyn FnOnce(Option<&Value>, &Value) -> CacheResult<Option<Value>> + Send>;

fn decode_at<T: DeserializeOwned>(key: &QueryKey, value: &Value) -> CacheResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| CacheError::Decode {
        key: key.clone(),
        reason: e.to_string(),
    })
}

fn encode_at<T: Serialize>(key: &QueryKey, value: &T) -> CacheResult<Value> {
    serde_json::to_value(value).map_err(|e| CacheError::Encode {
        key: key.clone(),
        reason: e.to_string(),
    })
}

/// How one target key changes during a mutation.
pub struct KeyUpdate {
    key: QueryKey,
    updater: Updater,
    reconciler: Option<Reconciler>,
    authoritative: bool,
    rollback: RollbackPolicy,
}

impl fmt::Debug for KeyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyUpdate")
            .field("key", &self.key)
            .field("reconciles", &self.reconciler.is_some())
            .field("authoritative", &self.authoritative)
            .field("rollback", &self.rollback)
            .finish()
    }
}

impl KeyUpdate {
    /// Untyped updater over the raw cached JSON.
    pub fn new<F>(key: QueryKey, updater: F) -> Self
    where
        F: FnOnce(Option<&Value>) -> CacheResult<OptimisticWrite> + Send + 'static,
    {
        Self {
            key,
            updater: Box::new(updater),
            reconciler: None,
            authoritative: false,
            rollback: RollbackPolicy::default(),
        }
    }

    /// Typed updater that also sees absent keys.
    ///
    /// Returning `None` removes the key.
    pub fn typed<T, F>(key: QueryKey, updater: F) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce(Option<T>) -> Option<T> + Send + 'static,
    {
        let at = key.clone();
        Self::new(key, move |previous| {
            let had_value = previous.is_some();
            let previous = previous.map(|v| decode_at::<T>(&at, v)).transpose()?;
            match updater(previous) {
                Some(next) => Ok(OptimisticWrite::Set(encode_at(&at, &next)?)),
                None if had_value => Ok(OptimisticWrite::Remove),
                None => Ok(OptimisticWrite::Unchanged),
            }
        })
    }

    /// Typed updater applied only when the key is cached.
    pub fn update<T, F>(key: QueryKey, updater: F) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce(T) -> T + Send + 'static,
    {
        let at = key.clone();
        Self::new(key, move |previous| match previous {
            Some(value) => {
                let next = updater(decode_at::<T>(&at, value)?);
                Ok(OptimisticWrite::Set(encode_at(&at, &next)?))
            }
            None => Ok(OptimisticWrite::Unchanged),
        })
    }

    /// Optimistically remove the key.
    pub fn remove(key: QueryKey) -> Self {
        Self::new(key, |_| Ok(OptimisticWrite::Remove))
    }

    /// Fold the server's canonical entity `S` into this key's value.
    ///
    /// Receives the current (optimistic) value. Returning `None` leaves the
    /// optimistic value in place. A decode failure of either side sends the
    /// mutation down the error path.
    ///
    /// The merged value is still invalidated on settle: only the entity was
    /// confirmed, not the rest of the value.
    pub fn reconcile<T, S, F>(mut self, reconciler: F) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        S: DeserializeOwned + 'static,
        F: FnOnce(Option<T>, S) -> Option<T> + Send + 'static,
    {
        let at = self.key.clone();
        self.reconciler = Some(Box::new(move |current: Option<&Value>, entity: &Value| {
            let current = current.map(|v| decode_at::<T>(&at, v)).transpose()?;
            let entity = decode_at::<S>(&at, entity)?;
            reconciler(current, entity)
                .map(|next| encode_at(&at, &next))
                .transpose()
        }));
        self.authoritative = false;
        self
    }

    /// Overwrite the key with the server entity as-is.
    ///
    /// The key then holds exactly what the server returned, so it stays
    /// fresh and is skipped when the target keys are invalidated.
    pub fn replace_with_server<T>(self) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let mut update = self.reconcile::<T, T, _>(|_, entity| Some(entity));
        update.authoritative = true;
        update
    }

    pub fn rollback(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = policy;
        self
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

/// A named optimistic mutation over one or more cache keys.
#[derive(Debug)]
pub struct Mutation {
    name: String,
    updates: Vec<KeyUpdate>,
    invalidates: Vec<QueryKey>,
}

impl Mutation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            updates: Vec::new(),
            invalidates: Vec::new(),
        }
    }

    /// Add a target key.
    pub fn update(mut self, update: KeyUpdate) -> Self {
        self.updates.push(update);
        self
    }

    /// Also invalidate everything under `pattern` once settled.
    pub fn invalidates(mut self, pattern: QueryKey) -> Self {
        self.invalidates.push(pattern);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.updates.iter().map(|u| &u.key)
    }

    fn validate(&self) -> CacheResult<()> {
        if self.updates.is_empty() {
            return Err(CacheError::InvalidMutation {
                name: self.name.clone(),
                reason: "no target keys".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for key in self.target_keys() {
            if !seen.insert(key) {
                return Err(CacheError::InvalidMutation {
                    name: self.name.clone(),
                    reason: format!("duplicate target key {}", key),
                });
            }
        }
        Ok(())
    }
}

/// A mutation whose optimistic writes are visible and whose server call has
/// not been settled yet.
///
/// Dropping it unsettled (for instance when the future awaiting the server
/// is cancelled) rolls back as if the call had failed with
/// [`MutationError::Cancelled`].
pub struct PendingMutation {
    client: QueryClient,
    id: MutationId,
    name: String,
    context: Option<MutationContext>,
    reconcilers: Vec<(QueryKey, Reconciler, bool)>,
    invalidates: Vec<QueryKey>,
    tracker: MutationTracker,
}

impl fmt::Debug for PendingMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingMutation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.tracker.state())
            .finish_non_exhaustive()
    }
}

impl PendingMutation {
    /// Steps 1-3: cancel refetches, snapshot, apply optimistically.
    pub fn begin(client: &QueryClient, mutation: Mutation) -> CacheResult<Self> {
        mutation.validate()?;
        let Mutation {
            name,
            updates,
            invalidates,
        } = mutation;
        let cache = client.cache();

        for update in &updates {
            if cache.cancel_fetches(&update.key)? {
                tracing::debug!(mutation = %name, key = %update.key, "Cancelled in-flight refetch");
            }
        }

        let id = MutationId::new();
        let mut reconcilers = Vec::new();
        let context = cache.transact(|txn| {
            let context = MutationContext::capture(
                txn,
                id,
                &name,
                updates.iter().map(|u| (&u.key, u.rollback)),
            );
            for KeyUpdate {
                key,
                updater,
                reconciler,
                authoritative,
                ..
            } in updates
            {
                let previous = txn.get(&key).map(|entry| &entry.value);
                match updater(previous)? {
                    OptimisticWrite::Set(value) => {
                        txn.put(key.clone(), value, EntrySource::Optimistic)
                    }
                    OptimisticWrite::Remove => txn.remove(key.clone()),
                    OptimisticWrite::Unchanged => {}
                }
                if let Some(reconciler) = reconciler {
                    reconcilers.push((key, reconciler, authoritative));
                }
            }
            Ok(context)
        })?;

        client.registry().insert(PendingMutationInfo {
            id,
            name: name.clone(),
            keys: context.keys().cloned().collect(),
        })?;

        let tracker = MutationTracker::new();
        let pending = Self {
            client: client.clone(),
            id,
            name,
            context: Some(context),
            reconcilers,
            invalidates,
            tracker,
        };
        pending.tracker.transition(MutationState::OptimisticApplied)?;
        tracing::debug!(
            mutation = %pending.name,
            id = %pending.id,
            keys = pending.context.as_ref().map(MutationContext::len).unwrap_or(0),
            "Optimistic update applied"
        );
        Ok(pending)
    }

    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> MutationState {
        self.tracker.state()
    }

    pub fn observe(&self) -> MutationObserver {
        self.tracker.observe()
    }

    pub fn context(&self) -> Option<&MutationContext> {
        self.context.as_ref()
    }

    /// Step 4 onwards: await the server call and settle.
    pub async fn run<Fut>(self, call: Fut) -> Result<ServerAck, MutationError>
    where
        Fut: Future<Output = Result<ServerAck, MutationError>>,
    {
        match call.await {
            Ok(ack) => self.succeed(ack),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Step 5a + 6: server wins, then invalidate.
    ///
    /// Keys replaced by the server entity are fresh and skipped when the
    /// target keys are invalidated. Keys the entity was merged into, and
    /// everything under the explicit `invalidates` patterns, are marked
    /// stale. A server entity that cannot be reconciled is handled like a
    /// failed call.
    pub fn succeed(mut self, ack: ServerAck) -> Result<ServerAck, MutationError> {
        let reconcilers = std::mem::take(&mut self.reconcilers);
        let confirmed = match self.reconcile(reconcilers, &ack) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(mutation = %self.name, error = %e, "Server response could not be reconciled");
                return Err(self.fail(MutationError::malformed(e.to_string())));
            }
        };

        self.tracker.transition(MutationState::SettledSuccess)?;
        let keys = self
            .context
            .take()
            .map(MutationContext::into_keys)
            .unwrap_or_default();
        self.client.registry().remove(self.id);
        self.settle(&keys, &confirmed);
        self.tracker.transition(MutationState::Reconciled)?;
        tracing::debug!(
            mutation = %self.name,
            id = %self.id,
            confirmed = confirmed.len(),
            "Mutation confirmed"
        );
        Ok(ack)
    }

    /// Step 5b + 6: restore every captured key, invalidate, surface `err`.
    pub fn fail(mut self, err: MutationError) -> MutationError {
        self.abort_with(err)
    }

    /// Apply the reconcilers; returns the keys replaced outright.
    fn reconcile(
        &self,
        reconcilers: Vec<(QueryKey, Reconciler, bool)>,
        ack: &ServerAck,
    ) -> CacheResult<HashSet<QueryKey>> {
        let ServerAck::Entity(entity) = ack else {
            return Ok(HashSet::new());
        };
        if reconcilers.is_empty() {
            return Ok(HashSet::new());
        }
        self.client.cache().transact(|txn| {
            let mut replaced = HashSet::new();
            for (key, reconciler, authoritative) in reconcilers {
                let current = txn.get(&key).map(|entry| &entry.value);
                if let Some(value) = reconciler(current, entity)? {
                    txn.put(key.clone(), value, EntrySource::Server);
                    if authoritative {
                        replaced.insert(key);
                    }
                }
            }
            Ok(replaced)
        })
    }

    fn abort_with(&mut self, err: MutationError) -> MutationError {
        if let Err(e) = self.tracker.transition(MutationState::SettledError) {
            tracing::warn!(mutation = %self.name, error = %e, "Unexpected mutation state");
        }
        let Some(context) = self.context.take() else {
            return err;
        };
        let keys: Vec<QueryKey> = context.keys().cloned().collect();
        let cache = self.client.cache();
        match context.restore(cache) {
            Ok(restored) => tracing::warn!(
                mutation = %self.name,
                id = %self.id,
                error = %err,
                restored = restored.len(),
                "Mutation failed, rolled back optimistic writes"
            ),
            Err(e) => tracing::error!(
                mutation = %self.name,
                id = %self.id,
                error = %e,
                "Rollback failed"
            ),
        }
        cache.record_rollback();
        self.client.registry().remove(self.id);
        self.settle(&keys, &HashSet::new());
        self.tracker.record_error(err.clone());
        if let Err(e) = self.tracker.transition(MutationState::Reconciled) {
            tracing::warn!(mutation = %self.name, error = %e, "Unexpected mutation state");
        }
        err
    }

    /// Step 6: mark targets and related patterns stale, schedule refetches.
    ///
    /// `confirmed` only shields target keys; explicit patterns always apply.
    fn settle(&self, keys: &[QueryKey], confirmed: &HashSet<QueryKey>) {
        self.client
            .invalidate_patterns(keys, confirmed, &self.invalidates);
    }
}

impl Drop for PendingMutation {
    fn drop(&mut self) {
        if self.context.is_some() {
            self.abort_with(MutationError::Cancelled);
        }
    }
}

// ============================================================================
// In-flight registry
// ============================================================================

/// A mutation that has applied its optimistic writes and not yet settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutationInfo {
    pub id: MutationId,
    pub name: String,
    pub keys: Vec<QueryKey>,
}

/// Process-wide set of unsettled mutations.
#[derive(Debug, Default)]
pub struct MutationRegistry {
    pending: Mutex<HashMap<MutationId, PendingMutationInfo>>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, info: PendingMutationInfo) -> CacheResult<()> {
        self.pending.lock()?.insert(info.id, info);
        Ok(())
    }

    fn remove(&self, id: MutationId) {
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.remove(&id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&id);
            }
        }
    }

    /// Unsettled mutations in start order.
    pub fn snapshot(&self) -> CacheResult<Vec<PendingMutationInfo>> {
        let mut infos: Vec<PendingMutationInfo> = self.pending.lock()?.values().cloned().collect();
        infos.sort_by_key(|info| info.id);
        Ok(infos)
    }

    /// True if any unsettled mutation targets a key under `pattern`.
    pub fn is_mutating(&self, pattern: &QueryKey) -> CacheResult<bool> {
        Ok(self
            .pending
            .lock()?
            .values()
            .any(|info| info.keys.iter().any(|key| QueryKey::matches(pattern, key))))
    }

    /// True if an unsettled mutation targets exactly `key`.
    pub fn is_key_pending(&self, key: &QueryKey) -> CacheResult<bool> {
        Ok(self
            .pending
            .lock()?
            .values()
            .any(|info| info.keys.contains(key)))
    }
}
