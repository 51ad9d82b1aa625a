//! Freshness contracts for cache reads.
//!
//! Callers state how stale a value they are willing to render, and every
//! read comes back as a [`CacheRead`] carrying the staleness metadata.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::store::EntrySource;

/// Freshness requirement for a query read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Serve only server-confirmed data that is inside its fresh window and
    /// has not been invalidated. Anything else is fetched first.
    #[default]
    Fresh,

    /// Serve data that has not been invalidated and is at most `max_age` old,
    /// regardless of its fresh window.
    MaxAge {
        /// Maximum acceptable age of the cached value.
        max_age: Duration,
    },

    /// Serve whatever is cached. A stale value is returned immediately and a
    /// background refetch is scheduled for it.
    StaleWhileRevalidate,
}

impl Freshness {
    pub fn fresh() -> Self {
        Self::Fresh
    }

    pub fn max_age(max_age: Duration) -> Self {
        Self::MaxAge { max_age }
    }

    pub fn stale_while_revalidate() -> Self {
        Self::StaleWhileRevalidate
    }

    /// Returns true if stale cached data may be handed to the caller.
    pub fn accepts_stale(&self) -> bool {
        matches!(self, Self::StaleWhileRevalidate)
    }
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The cached value.
    value: T,
    /// When the value was last written.
    updated_at: DateTime<Utc>,
    /// Where the value came from.
    source: EntrySource,
    /// Whether the value was past its fresh window or invalidated.
    stale: bool,
    /// Whether this was a cache hit or a fetch.
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// Create a read served from the cache.
    pub fn from_cache(
        value: T,
        updated_at: DateTime<Utc>,
        source: EntrySource,
        stale: bool,
    ) -> Self {
        Self {
            value,
            updated_at,
            source,
            stale,
            was_cache_hit: true,
        }
    }

    /// Create a read that came straight from a fetch (cache miss).
    pub fn from_fetch(value: T) -> Self {
        Self {
            value,
            updated_at: Utc::now(),
            source: EntrySource::Server,
            stale: false,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Check if the data was written at or after the given timestamp.
    pub fn is_fresh_as_of(&self, timestamp: DateTime<Utc>) -> bool {
        self.updated_at >= timestamp
    }

    /// Time elapsed since the value was written.
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn source(&self) -> EntrySource {
        self.source
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// True while the value is an unconfirmed optimistic write.
    pub fn is_optimistic(&self) -> bool {
        self.source == EntrySource::Optimistic
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            updated_at: self.updated_at,
            source: self.source,
            stale: self.stale,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_default_is_fresh() {
        assert_eq!(Freshness::default(), Freshness::Fresh);
        assert!(!Freshness::fresh().accepts_stale());
        assert!(Freshness::stale_while_revalidate().accepts_stale());
    }

    #[test]
    fn test_cache_read_from_cache() {
        let at = Utc::now();
        let read = CacheRead::from_cache("v", at, EntrySource::Optimistic, true);
        assert!(read.was_cache_hit());
        assert!(read.is_optimistic());
        assert!(read.is_stale());
        assert_eq!(read.updated_at(), at);
    }

    #[test]
    fn test_cache_read_from_fetch() {
        let read = CacheRead::from_fetch(42i32);
        assert!(read.was_cache_miss());
        assert!(!read.is_stale());
        assert_eq!(read.source(), EntrySource::Server);
        assert_eq!(read.into_value(), 42);
    }

    #[test]
    fn test_cache_read_age() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let read = CacheRead::from_cache("v", past, EntrySource::Server, false);
        assert!(read.age() >= Duration::from_secs(4));
        assert!(read.age() <= Duration::from_secs(10));
        assert!(read.is_fresh_as_of(past));
        assert!(!read.is_fresh_as_of(past + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_cache_read_map() {
        let read = CacheRead::from_fetch(7u32).map(|v| v.to_string());
        assert_eq!(read.into_value(), "7");
    }
}
