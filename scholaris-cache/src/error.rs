//! Error types for cache and mutation operations

use crate::key::QueryKey;
use crate::state::MutationState;
use thiserror::Error;

/// Errors raised by the cache store itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Failed to decode cached value at {key}: {reason}")]
    Decode { key: QueryKey, reason: String },

    #[error("Failed to encode value for {key}: {reason}")]
    Encode { key: QueryKey, reason: String },

    #[error("Fetch failed for {key}: {reason}")]
    Fetch { key: QueryKey, reason: String },

    #[error("Invalid mutation {name}: {reason}")]
    InvalidMutation { name: String, reason: String },

    #[error("Illegal mutation transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: MutationState,
        to: MutationState,
    },
}

/// Errors surfaced to the caller of a mutation.
///
/// Transport failures, `success: false` envelopes and malformed responses
/// all drive the same rollback path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Network error: {reason}")]
    Transport { reason: String },

    #[error("Server rejected mutation: {message}")]
    Rejected { message: String },

    #[error("Malformed server response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Mutation dropped before the server answered")]
    Cancelled,

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl MutationError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl<T> From<std::sync::PoisonError<T>> for CacheError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CacheError::LockPoisoned
    }
}

// =============================================================================
// TESTS
// =============================================================================
