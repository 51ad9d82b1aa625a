//! Core entity structures
//!
//! These mirror the payloads returned by the REST backend. The small
//! `with_*` helpers are pure transformations used as optimistic updaters.

use crate::{
    ApplicationId, CommentId, MessageId, PostId, ScholarshipId, TempId, ThreadId, Timestamp,
    UserId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COMMUNITY
// ============================================================================

/// Reaction a user can leave on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Celebrate,
    Support,
    Insightful,
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReactionKind::Like => "like",
            ReactionKind::Celebrate => "celebrate",
            ReactionKind::Support => "support",
            ReactionKind::Insightful => "insightful",
        };
        f.write_str(s)
    }
}

/// Community feed post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: PostId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    pub media_url: Option<String>,
    /// Total reactions of any kind.
    pub reaction_count: u32,
    /// The viewing user's own reaction, if any.
    pub user_reaction: Option<ReactionKind>,
    pub comment_count: u32,
    pub user_saved: bool,
    /// Set while the post only exists client-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_ref: Option<TempId>,
    pub created_at: Timestamp,
}

impl Post {
    /// Toggle the viewer's reaction.
    ///
    /// Same kind removes it, no reaction adds one, a different kind swaps
    /// without changing the total.
    pub fn with_reaction_toggled(mut self, kind: ReactionKind) -> Self {
        match self.user_reaction {
            Some(current) if current == kind => {
                self.user_reaction = None;
                self.reaction_count = self.reaction_count.saturating_sub(1);
            }
            Some(_) => {
                self.user_reaction = Some(kind);
            }
            None => {
                self.user_reaction = Some(kind);
                self.reaction_count += 1;
            }
        }
        self
    }

    pub fn with_saved(mut self, saved: bool) -> Self {
        self.user_saved = saved;
        self
    }

    pub fn with_comment_delta(mut self, delta: i64) -> Self {
        self.comment_count = apply_delta(self.comment_count, delta);
        self
    }

    pub fn user_reacted(&self) -> bool {
        self.user_reaction.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending_ref.is_some()
    }
}

/// Comment on a community post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_ref: Option<TempId>,
    pub created_at: Timestamp,
}

impl Comment {
    pub fn is_pending(&self) -> bool {
        self.pending_ref.is_some()
    }
}

/// Aggregate count cached next to a saved-items list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SavedCount {
    pub count: u32,
}

impl SavedCount {
    pub fn new(count: u32) -> Self {
        Self { count }
    }

    pub fn adjusted(self, delta: i64) -> Self {
        Self {
            count: apply_delta(self.count, delta),
        }
    }
}

// ============================================================================
// CHAT ASSISTANT
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A conversation with the scholarship assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub title: String,
    pub last_message_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: MessageId,
    pub thread_id: ThreadId,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_ref: Option<TempId>,
    pub created_at: Timestamp,
}

/// Full thread as cached under the chat detail key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTranscript {
    pub thread: ChatThread,
    pub messages: Vec<ChatMessage>,
}

// ============================================================================
// SCHOLARSHIPS & APPLICATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scholarship {
    pub scholarship_id: ScholarshipId,
    pub title: String,
    pub provider: String,
    /// Award amount in minor currency units.
    pub amount: Option<u64>,
    pub currency: Option<String>,
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub user_saved: bool,
}

impl Scholarship {
    pub fn with_saved(mut self, saved: bool) -> Self {
        self.user_saved = saved;
        self
    }
}

/// Progress of a user's application to a scholarship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Planning,
    InProgress,
    Submitted,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    /// Accepted and rejected applications are closed.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "planning" => Ok(Self::Planning),
            "in_progress" => Ok(Self::InProgress),
            "submitted" => Ok(Self::Submitted),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown application status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub application_id: ApplicationId,
    pub scholarship_id: ScholarshipId,
    pub user_id: UserId,
    pub status: ApplicationStatus,
    pub notes: Option<String>,
    pub submitted_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// One factor contributing to a match score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFactor {
    pub label: String,
    pub weight: f32,
    pub satisfied: bool,
}

/// How well a profile matches a scholarship, 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub scholarship_id: ScholarshipId,
    pub score: f32,
    #[serde(default)]
    pub factors: Vec<MatchFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    pub field_of_study: Option<String>,
    pub gpa: Option<f32>,
    pub country: Option<String>,
}

// ============================================================================
// UPLOADS
// ============================================================================

/// A file accepted by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

fn apply_delta(value: u32, delta: i64) -> u32 {
    let next = i64::from(value) + delta;
    next.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityIdType;
    use chrono::Utc;

    fn post(reactions: u32, reaction: Option<ReactionKind>) -> Post {
        Post {
            post_id: PostId::now_v7(),
            author_id: UserId::now_v7(),
            author_name: "Ada".to_string(),
            content: "Any tips for the STEM grant essay?".to_string(),
            media_url: None,
            reaction_count: reactions,
            user_reaction: reaction,
            comment_count: 0,
            user_saved: false,
            pending_ref: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_toggle_reaction_adds_then_removes() {
        let liked = post(3, None).with_reaction_toggled(ReactionKind::Like);
        assert_eq!(liked.reaction_count, 4);
        assert!(liked.user_reacted());

        let unliked = liked.with_reaction_toggled(ReactionKind::Like);
        assert_eq!(unliked.reaction_count, 3);
        assert!(!unliked.user_reacted());
    }

    #[test]
    fn test_toggle_reaction_swaps_kind_without_count_change() {
        let swapped =
            post(5, Some(ReactionKind::Like)).with_reaction_toggled(ReactionKind::Celebrate);
        assert_eq!(swapped.reaction_count, 5);
        assert_eq!(swapped.user_reaction, Some(ReactionKind::Celebrate));
    }

    #[test]
    fn test_counts_never_underflow() {
        assert_eq!(SavedCount::new(0).adjusted(-1).count, 0);
        assert_eq!(post(0, None).with_comment_delta(-3).comment_count, 0);
    }

    #[test]
    fn test_application_status_parse() {
        assert_eq!(
            "In Progress".parse::<ApplicationStatus>(),
            Ok(ApplicationStatus::InProgress)
        );
        assert!("archived".parse::<ApplicationStatus>().is_err());
        assert!(ApplicationStatus::Rejected.is_final());
        assert!(!ApplicationStatus::Submitted.is_final());
    }
}
