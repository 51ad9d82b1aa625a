//! Error types for the client crate.

use crate::api_client::ApiClientError;
use crate::config::ConfigError;
use scholaris_cache::{CacheError, MutationError};
use scholaris_core::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("Upload rejected: {0}")]
    Upload(String),
    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}

impl ClientError {
    /// Errors caught before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_) | ClientError::Upload(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
