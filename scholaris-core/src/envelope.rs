//! REST response envelope.
//!
//! Every backend endpoint answers with `{ success, message?, payload }`.
//! A `success: false` envelope is a failure even when the HTTP status is 2xx.

use crate::ApiError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub message: Option<String>,
    pub payload: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            message: None,
            payload: Some(payload),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            payload: None,
        }
    }

    /// Convert into the payload, treating `success: false` as an error.
    ///
    /// A successful envelope without payload is still an acknowledgement;
    /// callers that need the entity use [`ApiEnvelope::into_payload`].
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected {
                message: self
                    .message
                    .unwrap_or_else(|| "request failed".to_string()),
            });
        }
        Ok(self.payload)
    }

    pub fn into_payload(self) -> Result<T, ApiError> {
        self.into_result()?.ok_or(ApiError::MissingPayload)
    }
}

impl ApiEnvelope<serde_json::Value> {
    /// Decode the untyped payload into a concrete entity.
    pub fn decode_payload<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let value = self.into_payload()?;
        serde_json::from_value(value).map_err(|e| ApiError::Malformed {
            reason: e.to_string(),
        })
    }
}
