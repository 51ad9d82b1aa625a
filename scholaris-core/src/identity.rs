//! Identity types for Scholaris entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour of the strongly-typed entity identifiers.
pub trait EntityIdType: Copy + Eq + std::hash::Hash + fmt::Display {
    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Get the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a fresh timestamp-sortable identifier.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_entity_id!(
    /// Identifier of an authenticated user.
    UserId
);
define_entity_id!(
    /// Identifier of a community post.
    PostId
);
define_entity_id!(
    /// Identifier of a comment on a post.
    CommentId
);
define_entity_id!(
    /// Identifier of a chatbot conversation thread.
    ThreadId
);
define_entity_id!(
    /// Identifier of a single chat message.
    MessageId
);
define_entity_id!(
    /// Identifier of a scholarship listing.
    ScholarshipId
);
define_entity_id!(
    /// Identifier of a scholarship application.
    ApplicationId
);

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Placeholder marker carried by optimistically inserted records until the
/// server issues the real identifier.
///
/// Format: `temp-id-<unix millis>-<sequence>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    /// Prefix shared by every placeholder id.
    pub const PREFIX: &'static str = "temp-id-";

    /// Mint a new placeholder id from the current time.
    pub fn now() -> Self {
        let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{}{}-{}",
            Self::PREFIX,
            Utc::now().timestamp_millis(),
            seq
        ))
    }

    /// Parse a placeholder id, rejecting strings without the marker prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.starts_with(Self::PREFIX) && raw.len() > Self::PREFIX.len() {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
