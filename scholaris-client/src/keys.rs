//! Query key factory and the REST resource behind each key.
//!
//! Keys are grouped per domain so a single domain pattern invalidates
//! everything a feature view shows:
//!
//! | key | resource |
//! |-----|----------|
//! | `["posts", "list", {page}]` | `GET /api/posts?page=N` |
//! | `["posts", "detail", id]` | `GET /api/posts/{id}` |
//! | `["posts", "saved"]` | `GET /api/posts/saved` |
//! | `["posts", "saved-count"]` | `GET /api/posts/saved/count` |
//! | `["comments", post_id]` | `GET /api/posts/{id}/comments` |
//! | `["chat", "threads", user_id]` | `GET /api/chat/threads?user_id=..` |
//! | `["chat", "thread", id]` | `GET /api/chat/threads/{id}` |
//! | `["scholarships", "list"]` | `GET /api/scholarships` |
//! | `["scholarships", "detail", id]` | `GET /api/scholarships/{id}` |
//! | `["scholarships", "saved"]` | `GET /api/scholarships/saved` |
//! | `["scholarships", "saved-count"]` | `GET /api/scholarships/saved/count` |
//! | `["scholarships", "match", id]` | `GET /api/scholarships/{id}/match` |
//! | `["applications", "list"]` | `GET /api/applications` |
//! | `["applications", "detail", id]` | `GET /api/applications/{id}` |
//! | `["profile", "me"]` | `GET /api/profile` |

use scholaris_cache::{query_key, KeySegment, QueryKey};
use scholaris_core::{ApplicationId, EntityIdType, PostId, ScholarshipId, ThreadId, UserId};

pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comments";
pub const CHAT: &str = "chat";
pub const SCHOLARSHIPS: &str = "scholarships";
pub const APPLICATIONS: &str = "applications";
pub const PROFILE: &str = "profile";

/// Every domain with a REST-backed fetcher.
pub const DOMAINS: [&str; 6] = [POSTS, COMMENTS, CHAT, SCHOLARSHIPS, APPLICATIONS, PROFILE];

// ----------------------------------------------------------------------------
// Community
// ----------------------------------------------------------------------------

pub fn posts() -> QueryKey {
    QueryKey::new(POSTS)
}

/// Pattern over every cached feed page.
pub fn post_lists() -> QueryKey {
    query_key!(POSTS, "list")
}

pub fn post_list(page: u32) -> QueryKey {
    post_lists().with_params([("page", page)])
}

pub fn post_detail(post_id: PostId) -> QueryKey {
    query_key!(POSTS, "detail", post_id.as_uuid())
}

pub fn saved_posts() -> QueryKey {
    query_key!(POSTS, "saved")
}

pub fn saved_post_count() -> QueryKey {
    query_key!(POSTS, "saved-count")
}

pub fn comments(post_id: PostId) -> QueryKey {
    query_key!(COMMENTS, post_id.as_uuid())
}

// ----------------------------------------------------------------------------
// Chat assistant
// ----------------------------------------------------------------------------

pub fn chat_threads(user_id: UserId) -> QueryKey {
    query_key!(CHAT, "threads", user_id.as_uuid())
}

pub fn chat_thread(thread_id: ThreadId) -> QueryKey {
    query_key!(CHAT, "thread", thread_id.as_uuid())
}

// ----------------------------------------------------------------------------
// Scholarships and applications
// ----------------------------------------------------------------------------

pub fn scholarships() -> QueryKey {
    QueryKey::new(SCHOLARSHIPS)
}

pub fn scholarship_list() -> QueryKey {
    query_key!(SCHOLARSHIPS, "list")
}

pub fn scholarship_detail(scholarship_id: ScholarshipId) -> QueryKey {
    query_key!(SCHOLARSHIPS, "detail", scholarship_id.as_uuid())
}

pub fn saved_scholarships() -> QueryKey {
    query_key!(SCHOLARSHIPS, "saved")
}

pub fn saved_scholarship_count() -> QueryKey {
    query_key!(SCHOLARSHIPS, "saved-count")
}

/// How well the viewer's profile fits one scholarship.
pub fn match_score(scholarship_id: ScholarshipId) -> QueryKey {
    query_key!(SCHOLARSHIPS, "match", scholarship_id.as_uuid())
}

pub fn application_list() -> QueryKey {
    query_key!(APPLICATIONS, "list")
}

pub fn application_detail(application_id: ApplicationId) -> QueryKey {
    query_key!(APPLICATIONS, "detail", application_id.as_uuid())
}

/// The signed-in user's profile.
pub fn profile() -> QueryKey {
    query_key!(PROFILE, "me")
}

fn text(segment: &KeySegment) -> Option<&str> {
    match segment {
        KeySegment::Text(s) => Some(s),
        _ => None,
    }
}

fn query_string(segment: &KeySegment) -> Option<String> {
    match segment {
        KeySegment::Params(params) if !params.is_empty() => {
            let pairs: Vec<String> = params
                .iter()
                .map(|(name, value)| {
                    let raw = match value {
                        KeySegment::Text(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!("{}={}", urlencoding::encode(name), urlencoding::encode(&raw))
                })
                .collect();
            Some(format!("?{}", pairs.join("&")))
        }
        _ => None,
    }
}

/// REST path that serves the value cached under `key`.
///
/// Returns `None` for patterns and for keys no endpoint backs.
pub fn resource_path(key: &QueryKey) -> Option<String> {
    let segments = key.segments();
    let domain = key.domain()?;
    let rest = &segments[1..];

    match (domain, rest) {
        (POSTS, [kind]) => match text(kind)? {
            "list" => Some("/api/posts".to_string()),
            "saved" => Some("/api/posts/saved".to_string()),
            "saved-count" => Some("/api/posts/saved/count".to_string()),
            _ => None,
        },
        (POSTS, [kind, params]) if text(kind) == Some("list") => {
            Some(format!("/api/posts{}", query_string(params).unwrap_or_default()))
        }
        (POSTS, [kind, KeySegment::Id(id)]) if text(kind) == Some("detail") => {
            Some(format!("/api/posts/{}", id))
        }
        (COMMENTS, [KeySegment::Id(post_id)]) => Some(format!("/api/posts/{}/comments", post_id)),
        (CHAT, [kind, KeySegment::Id(id)]) => match text(kind)? {
            "threads" => Some(format!("/api/chat/threads?user_id={}", id)),
            "thread" => Some(format!("/api/chat/threads/{}", id)),
            _ => None,
        },
        (SCHOLARSHIPS, [kind]) => match text(kind)? {
            "list" => Some("/api/scholarships".to_string()),
            "saved" => Some("/api/scholarships/saved".to_string()),
            "saved-count" => Some("/api/scholarships/saved/count".to_string()),
            _ => None,
        },
        (SCHOLARSHIPS, [kind, KeySegment::Id(id)]) => match text(kind)? {
            "detail" => Some(format!("/api/scholarships/{}", id)),
            "match" => Some(format!("/api/scholarships/{}/match", id)),
            _ => None,
        },
        (APPLICATIONS, [kind]) if text(kind) == Some("list") => {
            Some("/api/applications".to_string())
        }
        (APPLICATIONS, [kind, KeySegment::Id(id)]) if text(kind) == Some("detail") => {
            Some(format!("/api/applications/{}", id))
        }
        (PROFILE, [kind]) if text(kind) == Some("me") => Some("/api/profile".to_string()),
        _ => None,
    }
}
