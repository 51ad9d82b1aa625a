//! Scholaris Cache
//!
//! Normalized client-side query cache with an optimistic mutation protocol:
//! mutations write to the cache before the server answers, then either adopt
//! the server's canonical entity or roll every touched key back together.
//! Afterwards the touched keys and related patterns are invalidated so a
//! background refetch reconciles them with the server.
//!
//! # Layout
//!
//! - [`key`]: hierarchical [`QueryKey`]s with prefix matching
//! - [`store`]: the ordered entry map, fetch epochs and change events
//! - [`freshness`]: read contracts and [`CacheRead`] metadata
//! - [`state`]: the mutation lifecycle and its observers
//! - [`rollback`]: per-invocation snapshots
//! - [`mutation`]: the mutation builder and [`PendingMutation`]
//! - [`client`]: [`QueryClient`], fetchers and background refetch

pub mod client;
pub mod error;
pub mod freshness;
pub mod key;
pub mod mutation;
pub mod rollback;
pub mod state;
pub mod store;

pub use client::{CacheConfig, QueryClient, QueryFetcher};
pub use error::{CacheError, CacheResult, MutationError};
pub use freshness::{CacheRead, Freshness};
pub use key::{KeySegment, QueryKey};
pub use mutation::{
    KeyUpdate, Mutation, MutationId, MutationRegistry, OptimisticWrite, PendingMutation,
    PendingMutationInfo, ServerAck,
};
pub use rollback::{MutationContext, RollbackPolicy};
pub use state::{MutationObserver, MutationState, MutationStatus, MutationTracker};
pub use store::{CacheEntry, CacheEvent, CacheStats, EntrySource, FetchTicket, QueryCache};
