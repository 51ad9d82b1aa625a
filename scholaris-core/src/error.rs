//! Error types for Scholaris operations

use thiserror::Error;

/// Client-side validation errors.
///
/// These are raised before any request or cache write happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{field} is too long: {len} characters, limit is {max}")]
    TooLong { field: String, len: usize, max: usize },

    #[error("Malformed date for {field}: {value} (expected YYYY-MM-DD)")]
    MalformedDate { field: String, value: String },
}

/// Errors reported through the REST envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Server rejected request: {message}")]
    Rejected { message: String },

    #[error("Server response missing payload")]
    MissingPayload,

    #[error("Malformed server response: {reason}")]
    Malformed { reason: String },
}

/// Master error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum ScholarisError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Result type alias for core operations.
pub type ScholarisResult<T> = Result<T, ScholarisError>;

// =============================================================================
// TESTS
// =============================================================================
