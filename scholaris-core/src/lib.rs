//! Scholaris Core - Entity Types
//!
//! Data structures shared by the cache and client crates: identifiers,
//! domain entities, the REST envelope, the error taxonomy and client-side
//! form validation. No I/O happens here.

pub mod entities;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod validation;

pub use entities::{
    Application, ApplicationStatus, ChatMessage, ChatRole, ChatThread, ChatTranscript, Comment,
    MatchFactor, MatchScore, Post, ReactionKind, SavedCount, Scholarship, UploadedFile, UserProfile,
};
pub use envelope::ApiEnvelope;
pub use error::{ApiError, ScholarisError, ScholarisResult, ValidationError};
pub use identity::{
    ApplicationId, CommentId, EntityIdType, MessageId, PostId, ScholarshipId, TempId, ThreadId,
    Timestamp, UserId,
};
pub use validation::{
    ApplicationUpdateForm, ChatPrompt, CommentForm, PostForm, UploadPolicy, UploadValidation,
};
