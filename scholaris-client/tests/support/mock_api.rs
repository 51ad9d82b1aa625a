//! Scripted in-memory backend for client tests.

#![allow(dead_code)]

use async_trait::async_trait;
use scholaris_cache::{CacheConfig, QueryClient};
use scholaris_client::{ApiClientError, NotificationCenter, ScholarisApi, ScholarisClient, Viewer};
use scholaris_core::{
    ApiError, Application, ApplicationId, ApplicationUpdateForm, ChatMessage, ChatPrompt, Comment,
    CommentForm, CommentId, EntityIdType, Post, PostForm, PostId, ReactionKind, ScholarshipId,
    ThreadId, UploadPolicy, UploadedFile, UserId,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the backend answers one operation.
#[derive(Debug, Clone)]
pub enum Reply {
    Entity(Value),
    Ack,
    /// `success: false` with this message.
    Rejected(String),
    /// Non-2xx without an envelope.
    Unavailable,
}

type Hook = Box<dyn Fn(&'static str) + Send + Sync>;

#[derive(Default)]
pub struct MockApi {
    resources: Mutex<HashMap<String, Value>>,
    replies: Mutex<HashMap<&'static str, Reply>>,
    calls: Mutex<Vec<&'static str>>,
    hook: Mutex<Option<Hook>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `value` for GET `path`.
    pub fn serve(&self, path: &str, value: Value) {
        self.resources
            .lock()
            .unwrap()
            .insert(path.to_string(), value);
    }

    pub fn reply(&self, operation: &'static str, reply: Reply) {
        self.replies.lock().unwrap().insert(operation, reply);
    }

    pub fn reply_entity<T: Serialize>(&self, operation: &'static str, entity: &T) {
        self.reply(operation, Reply::Entity(serde_json::to_value(entity).unwrap()));
    }

    /// Run `hook` at the start of every call, before the reply is produced.
    pub fn on_call<F>(&self, hook: F)
    where
        F: Fn(&'static str) + Send + Sync + 'static,
    {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, operation: &'static str) -> Result<Value, ApiClientError> {
        self.calls.lock().unwrap().push(operation);
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(operation);
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(operation)
            .cloned()
            .unwrap_or(Reply::Ack);
        match reply {
            Reply::Entity(value) => Ok(value),
            Reply::Ack => Ok(Value::Null),
            Reply::Rejected(message) => Err(ApiError::Rejected { message }.into()),
            Reply::Unavailable => Err(ApiClientError::InvalidResponse(
                "HTTP 503: upstream unavailable".to_string(),
            )),
        }
    }

    fn entity<T: DeserializeOwned>(&self, operation: &'static str) -> Result<T, ApiClientError> {
        Ok(serde_json::from_value(self.answer(operation)?)?)
    }
}

#[async_trait]
impl ScholarisApi for MockApi {
    async fn fetch_value(&self, path: &str) -> Result<Value, ApiClientError> {
        self.calls.lock().unwrap().push("fetch_value");
        self.resources
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ApiClientError::InvalidResponse(format!("HTTP 404: {}", path)))
    }

    async fn react_to_post(&self, _post_id: PostId, _kind: ReactionKind) -> Result<Post, ApiClientError> {
        self.entity("react_to_post")
    }

    async fn set_post_saved(&self, _post_id: PostId, _saved: bool) -> Result<(), ApiClientError> {
        self.answer("set_post_saved").map(|_| ())
    }

    async fn create_post(&self, _form: &PostForm) -> Result<Post, ApiClientError> {
        self.entity("create_post")
    }

    async fn create_comment(&self, _post_id: PostId, _form: &CommentForm) -> Result<Comment, ApiClientError> {
        self.entity("create_comment")
    }

    async fn delete_comment(&self, _post_id: PostId, _comment_id: CommentId) -> Result<(), ApiClientError> {
        self.answer("delete_comment").map(|_| ())
    }

    async fn delete_post(&self, _post_id: PostId) -> Result<(), ApiClientError> {
        self.answer("delete_post").map(|_| ())
    }

    async fn send_chat_message(
        &self,
        _thread_id: ThreadId,
        _prompt: &ChatPrompt,
    ) -> Result<Vec<ChatMessage>, ApiClientError> {
        self.entity("send_chat_message")
    }

    async fn delete_thread(&self, _thread_id: ThreadId) -> Result<(), ApiClientError> {
        self.answer("delete_thread").map(|_| ())
    }

    async fn set_scholarship_saved(
        &self,
        _scholarship_id: ScholarshipId,
        _saved: bool,
    ) -> Result<(), ApiClientError> {
        self.answer("set_scholarship_saved").map(|_| ())
    }

    async fn update_application(
        &self,
        _application_id: ApplicationId,
        _form: &ApplicationUpdateForm,
    ) -> Result<Application, ApiClientError> {
        self.entity("update_application")
    }

    async fn upload_file(
        &self,
        _file_name: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<UploadedFile, ApiClientError> {
        self.entity("upload_file")
    }
}

pub fn viewer() -> Viewer {
    Viewer {
        user_id: UserId::now_v7(),
        display_name: "Ada".to_string(),
    }
}

pub fn upload_policy() -> UploadPolicy {
    UploadPolicy {
        max_bytes: 1024 * 1024,
        allowed_content_types: vec!["image/*".to_string(), "application/pdf".to_string()],
    }
}

/// Client over a fresh [`MockApi`], without background refetch.
pub fn test_client() -> (ScholarisClient<MockApi>, Arc<MockApi>) {
    test_client_with(CacheConfig::new().with_refetch_on_invalidate(false))
}

pub fn test_client_with(config: CacheConfig) -> (ScholarisClient<MockApi>, Arc<MockApi>) {
    let api = MockApi::new();
    let client = ScholarisClient::new(
        Arc::clone(&api),
        QueryClient::new(config),
        NotificationCenter::new(3, Duration::from_secs(5)),
        upload_policy(),
        viewer(),
    )
    .unwrap();
    (client, api)
}
