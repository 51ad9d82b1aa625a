//! Client-side form validation.
//!
//! Everything here runs before a mutation starts, so a rejected form never
//! touches the cache. Upload checks return an [`UploadValidation`] value
//! instead of an error so callers can render the message inline.

use crate::{ApplicationStatus, ValidationError};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of a community post body.
pub const MAX_POST_LENGTH: usize = 5_000;

/// Maximum length of a comment.
pub const MAX_COMMENT_LENGTH: usize = 1_000;

/// Maximum length of a single chat prompt.
pub const MAX_CHAT_MESSAGE_LENGTH: usize = 2_000;

static ISO_DATE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").ok());

fn required_text(field: &str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    let len = trimmed.chars().count();
    if len > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            len,
            max,
        });
    }
    Ok(trimmed.to_string())
}

/// Validated input for a new post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostForm {
    pub content: String,
    pub media_url: Option<String>,
}

impl PostForm {
    pub fn new(content: &str, media_url: Option<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            content: required_text("content", content, MAX_POST_LENGTH)?,
            media_url,
        })
    }
}

/// Validated input for a new comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentForm {
    pub content: String,
}

impl CommentForm {
    pub fn new(content: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            content: required_text("content", content, MAX_COMMENT_LENGTH)?,
        })
    }
}

/// Validated prompt for the chat assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub content: String,
}

impl ChatPrompt {
    pub fn new(content: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            content: required_text("message", content, MAX_CHAT_MESSAGE_LENGTH)?,
        })
    }
}

/// Validated status change for an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationUpdateForm {
    pub status: ApplicationStatus,
    pub notes: Option<String>,
    pub submitted_on: Option<NaiveDate>,
}

impl ApplicationUpdateForm {
    pub fn new(
        status: &str,
        notes: Option<&str>,
        submitted_on: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let status = status
            .parse::<ApplicationStatus>()
            .map_err(|reason| ValidationError::InvalidValue {
                field: "status".to_string(),
                reason,
            })?;
        let submitted_on = submitted_on
            .map(|raw| parse_date("submitted_on", raw))
            .transpose()?;
        if status == ApplicationStatus::Submitted && submitted_on.is_none() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "submitted_on".to_string(),
            });
        }
        let notes = notes
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        Ok(Self {
            status,
            notes,
            submitted_on,
        })
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ValidationError> {
    let malformed = || ValidationError::MalformedDate {
        field: field.to_string(),
        value: raw.to_string(),
    };
    let raw = raw.trim();
    let shape_ok = ISO_DATE_RE
        .as_ref()
        .map(|re| re.is_match(raw))
        .unwrap_or(false);
    if !shape_ok {
        return Err(malformed());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| malformed())
}

// ============================================================================
// UPLOADS
// ============================================================================

/// Limits applied to files before they are uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

/// Outcome of an upload pre-check: `{ valid, error }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadValidation {
    pub valid: bool,
    pub error: Option<String>,
}

impl UploadValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

impl UploadPolicy {
    pub fn validate(&self, file_name: &str, content_type: &str, size: u64) -> UploadValidation {
        if file_name.trim().is_empty() {
            return UploadValidation::invalid("File name is required");
        }
        if size == 0 {
            return UploadValidation::invalid("File is empty");
        }
        if size > self.max_bytes {
            return UploadValidation::invalid(format!(
                "File is too large: {} bytes, limit is {} bytes",
                size, self.max_bytes
            ));
        }
        let content_type = content_type.trim().to_ascii_lowercase();
        let allowed = self.allowed_content_types.iter().any(|allowed| {
            let allowed = allowed.to_ascii_lowercase();
            match allowed.strip_suffix("/*") {
                Some(family) => content_type
                    .split('/')
                    .next()
                    .map(|f| f == family)
                    .unwrap_or(false),
                None => allowed == content_type,
            }
        });
        if !allowed {
            return UploadValidation::invalid(format!(
                "File type {} is not allowed",
                content_type
            ));
        }
        UploadValidation::valid()
    }
}
