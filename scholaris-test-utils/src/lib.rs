//! Scholaris Test Utilities
//!
//! Shared test infrastructure for the Scholaris workspace:
//! - Proptest generators for entity types and query keys
//! - Scripted fetchers and gated server calls
//! - Test fixtures for common scenarios
//! - Assertions over cache contents

pub use scholaris_cache::{
    CacheError, CacheResult, EntrySource, MutationError, QueryClient, QueryFetcher, QueryKey,
    ServerAck,
};
pub use scholaris_core::{
    Application, ApplicationId, ApplicationStatus, ChatMessage, ChatRole, ChatThread,
    ChatTranscript, Comment, CommentId, EntityIdType, MessageId, Post, PostId, ReactionKind,
    SavedCount, Scholarship, ScholarshipId, TempId, ThreadId, Timestamp, UserId,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Notify};

// ============================================================================
// FETCHERS
// ============================================================================

/// Fetcher that serves canned values per key and counts calls.
///
/// Keys without a canned value fail with [`CacheError::Fetch`].
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<QueryKey, Value>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set (or replace) the server value for `key`.
    pub fn respond(&self, key: QueryKey, value: Value) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(key, value);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryFetcher for ScriptedFetcher {
    async fn fetch(&self, key: &QueryKey) -> CacheResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = self
            .responses
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?
            .get(key)
            .cloned();
        value.ok_or_else(|| CacheError::Fetch {
            key: key.clone(),
            reason: "no scripted response".to_string(),
        })
    }
}

/// Fetcher that blocks until released, then returns a fixed value.
///
/// Used to hold a background refetch in flight while a mutation starts.
#[derive(Debug)]
pub struct GatedFetcher {
    value: Value,
    gate: Notify,
    started: Notify,
    calls: AtomicUsize,
}

impl GatedFetcher {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Self {
            value,
            gate: Notify::new(),
            started: Notify::new(),
            calls: AtomicUsize::new(0),
        })
    }

    /// Wait until a fetch has entered the gate.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let one waiting fetch complete.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryFetcher for GatedFetcher {
    async fn fetch(&self, _key: &QueryKey) -> CacheResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.gate.notified().await;
        Ok(self.value.clone())
    }
}

// ============================================================================
// SERVER CALLS
// ============================================================================

/// Controls the outcome of a server call created by [`gated_server_call`].
#[derive(Debug)]
pub struct ServerGate {
    tx: oneshot::Sender<Result<ServerAck, MutationError>>,
}

impl ServerGate {
    pub fn resolve(self, ack: ServerAck) {
        let _ = self.tx.send(Ok(ack));
    }

    pub fn reject(self, err: MutationError) {
        let _ = self.tx.send(Err(err));
    }
}

/// A server call that stays pending until its gate is resolved or rejected.
pub fn gated_server_call() -> (
    ServerGate,
    impl Future<Output = Result<ServerAck, MutationError>> + Send + 'static,
) {
    let (tx, rx) = oneshot::channel();
    let call = async move {
        rx.await
            .unwrap_or_else(|_| Err(MutationError::transport("server gate dropped")))
    };
    (ServerGate { tx }, call)
}

/// A server call that resolves immediately with `ack`.
pub async fn confirm(ack: ServerAck) -> Result<ServerAck, MutationError> {
    Ok(ack)
}

/// A server call that fails immediately with a transport error.
pub async fn network_failure() -> Result<ServerAck, MutationError> {
    Err(MutationError::transport("connection reset by peer"))
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Scholaris entity types.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use scholaris_cache::KeySegment;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_post_id() -> impl Strategy<Value = PostId> {
        arb_uuid().prop_map(PostId::new)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::new)
    }

    pub fn arb_scholarship_id() -> impl Strategy<Value = ScholarshipId> {
        arb_uuid().prop_map(ScholarshipId::new)
    }

    /// Generate a timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64)
            .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now))
    }

    pub fn arb_reaction_kind() -> impl Strategy<Value = ReactionKind> {
        prop_oneof![
            Just(ReactionKind::Like),
            Just(ReactionKind::Celebrate),
            Just(ReactionKind::Support),
            Just(ReactionKind::Insightful),
        ]
    }

    pub fn arb_application_status() -> impl Strategy<Value = ApplicationStatus> {
        prop_oneof![
            Just(ApplicationStatus::Planning),
            Just(ApplicationStatus::InProgress),
            Just(ApplicationStatus::Submitted),
            Just(ApplicationStatus::Accepted),
            Just(ApplicationStatus::Rejected),
        ]
    }

    /// Generate a server-confirmed post.
    pub fn arb_post() -> impl Strategy<Value = Post> {
        (
            arb_post_id(),
            arb_user_id(),
            "[A-Za-z ]{1,40}",
            0u32..500,
            proptest::option::of(arb_reaction_kind()),
            0u32..100,
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                |(post_id, author_id, content, reactions, reaction, comments, saved, created_at)| {
                    Post {
                        post_id,
                        author_id,
                        author_name: "Test Author".to_string(),
                        content,
                        media_url: None,
                        // A viewer reaction is part of the total.
                        reaction_count: reactions + u32::from(reaction.is_some()),
                        user_reaction: reaction,
                        comment_count: comments,
                        user_saved: saved,
                        pending_ref: None,
                        created_at,
                    }
                },
            )
    }

    pub fn arb_saved_count() -> impl Strategy<Value = SavedCount> {
        (0u32..1000).prop_map(SavedCount::new)
    }

    pub fn arb_scholarship() -> impl Strategy<Value = Scholarship> {
        (
            arb_scholarship_id(),
            "[A-Za-z ]{1,30}",
            proptest::option::of(100u64..5_000_000),
            any::<bool>(),
        )
            .prop_map(|(scholarship_id, title, amount, user_saved)| Scholarship {
                scholarship_id,
                title,
                provider: "Test Foundation".to_string(),
                amount,
                currency: amount.map(|_| "USD".to_string()),
                deadline: None,
                tags: vec![],
                user_saved,
            })
    }

    /// Generate a key under one of the application's query domains.
    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        let domain = prop_oneof![
            Just("posts"),
            Just("comments"),
            Just("chat"),
            Just("scholarships"),
            Just("applications"),
        ];
        let segment = prop_oneof![
            "[a-z]{1,6}".prop_map(KeySegment::Text),
            (0i64..20).prop_map(KeySegment::Int),
            arb_uuid().prop_map(KeySegment::Id),
        ];
        (domain, prop::collection::vec(segment, 0..3)).prop_map(|(domain, segments)| {
            segments
                .into_iter()
                .fold(QueryKey::new(domain), |key, segment| key.with(segment))
        })
    }

    /// Generate a small JSON value to cache.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
            (0u32..1000).prop_map(|count| serde_json::json!({ "count": count })),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{NaiveDate, Utc};

    /// A confirmed post with the given reaction total and viewer reaction.
    pub fn post(reaction_count: u32, user_reaction: Option<ReactionKind>) -> Post {
        Post {
            post_id: PostId::now_v7(),
            author_id: UserId::now_v7(),
            author_name: "Ada".to_string(),
            content: "Just got shortlisted for the STEM award!".to_string(),
            media_url: None,
            reaction_count,
            user_reaction,
            comment_count: 0,
            user_saved: false,
            pending_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Post with 3 reactions, none from the viewer.
    pub fn unliked_post() -> Post {
        post(3, None)
    }

    pub fn comment(post_id: PostId, content: &str) -> Comment {
        Comment {
            comment_id: CommentId::now_v7(),
            post_id,
            author_id: UserId::now_v7(),
            author_name: "Grace".to_string(),
            content: content.to_string(),
            pending_ref: None,
            created_at: Utc::now(),
        }
    }

    pub fn thread(user_id: UserId, title: &str) -> ChatThread {
        ChatThread {
            thread_id: ThreadId::now_v7(),
            user_id,
            title: title.to_string(),
            last_message_at: Some(Utc::now()),
        }
    }

    pub fn assistant_message(thread_id: ThreadId, content: &str) -> ChatMessage {
        ChatMessage {
            message_id: MessageId::now_v7(),
            thread_id,
            role: ChatRole::Assistant,
            content: content.to_string(),
            pending_ref: None,
            created_at: Utc::now(),
        }
    }

    pub fn transcript(thread: ChatThread) -> ChatTranscript {
        let greeting = assistant_message(thread.thread_id, "How can I help with your search?");
        ChatTranscript {
            thread,
            messages: vec![greeting],
        }
    }

    pub fn scholarship(title: &str) -> Scholarship {
        Scholarship {
            scholarship_id: ScholarshipId::now_v7(),
            title: title.to_string(),
            provider: "Open Futures Foundation".to_string(),
            amount: Some(250_000),
            currency: Some("USD".to_string()),
            deadline: NaiveDate::from_ymd_opt(2027, 3, 31),
            tags: vec!["stem".to_string()],
            user_saved: false,
        }
    }

    pub fn application(scholarship_id: ScholarshipId, status: ApplicationStatus) -> Application {
        Application {
            application_id: ApplicationId::now_v7(),
            scholarship_id,
            user_id: UserId::now_v7(),
            status,
            notes: None,
            submitted_at: None,
            updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over what a [`QueryClient`] currently caches.

    use super::*;
    use serde::de::DeserializeOwned;
    use std::fmt::Debug;

    /// Assert that `key` currently holds `expected`.
    #[track_caller]
    pub fn assert_cached<T>(client: &QueryClient, key: &QueryKey, expected: &T)
    where
        T: DeserializeOwned + PartialEq + Debug,
    {
        match client.get_query_data::<T>(key) {
            Ok(Some(actual)) => assert_eq!(&actual, expected, "Unexpected value at {}", key),
            other => panic!("Expected a cached value at {}, got: {:?}", key, other),
        }
    }

    /// Assert that nothing is cached at `key`.
    #[track_caller]
    pub fn assert_absent(client: &QueryClient, key: &QueryKey) {
        match client.cache().get(key) {
            Ok(None) => {}
            other => panic!("Expected no entry at {}, got: {:?}", key, other),
        }
    }

    /// Assert that the entry at `key` is stale.
    #[track_caller]
    pub fn assert_stale(client: &QueryClient, key: &QueryKey) {
        match client.cache().get(key) {
            Ok(Some(entry)) => assert!(entry.is_stale(), "Expected {} to be stale", key),
            other => panic!("Expected an entry at {}, got: {:?}", key, other),
        }
    }

    /// Assert that the entry at `key` is server-confirmed and fresh.
    #[track_caller]
    pub fn assert_fresh(client: &QueryClient, key: &QueryKey) {
        match client.cache().get(key) {
            Ok(Some(entry)) => {
                assert_eq!(entry.source, EntrySource::Server, "Expected {} from server", key);
                assert!(!entry.is_stale(), "Expected {} to be fresh", key);
            }
            other => panic!("Expected an entry at {}, got: {:?}", key, other),
        }
    }
}
