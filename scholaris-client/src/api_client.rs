//! REST client for the Scholaris backend.
//!
//! Every endpoint answers with an [`ApiEnvelope`]. The envelope is unwrapped
//! here so callers only ever see the payload or an [`ApiClientError`].

use crate::config::{AuthConfig, ScholarisConfig};
use crate::keys;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use scholaris_cache::{CacheError, CacheResult, MutationError, QueryFetcher, QueryKey};
use scholaris_core::{
    ApiEnvelope, ApiError, Application, ApplicationId, ApplicationUpdateForm, ChatMessage,
    ChatPrompt, Comment, CommentForm, CommentId, EntityIdType, Post, PostForm, PostId, ReactionKind,
    ScholarshipId, ThreadId, UploadedFile,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl From<ApiClientError> for MutationError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::Api(ApiError::Rejected { message }) => MutationError::rejected(message),
            ApiClientError::Api(ApiError::MissingPayload) => {
                MutationError::malformed("response missing payload")
            }
            ApiClientError::Api(ApiError::Malformed { reason }) => MutationError::malformed(reason),
            ApiClientError::Serde(e) => MutationError::malformed(e.to_string()),
            other => MutationError::transport(other.to_string()),
        }
    }
}

/// Backend operations used by the feature mutations and query fetchers.
#[async_trait]
pub trait ScholarisApi: Send + Sync {
    /// GET the payload at `path` (relative to the API base URL).
    async fn fetch_value(&self, path: &str) -> Result<Value, ApiClientError>;

    async fn react_to_post(&self, post_id: PostId, kind: ReactionKind) -> Result<Post, ApiClientError>;

    async fn set_post_saved(&self, post_id: PostId, saved: bool) -> Result<(), ApiClientError>;

    async fn create_post(&self, form: &PostForm) -> Result<Post, ApiClientError>;

    async fn create_comment(&self, post_id: PostId, form: &CommentForm) -> Result<Comment, ApiClientError>;

    async fn delete_comment(
        &self,
        post_id: PostId,
        comment_id: CommentId,
    ) -> Result<(), ApiClientError>;

    async fn delete_post(&self, post_id: PostId) -> Result<(), ApiClientError>;

    /// Returns the stored user message followed by the assistant reply.
    async fn send_chat_message(
        &self,
        thread_id: ThreadId,
        prompt: &ChatPrompt,
    ) -> Result<Vec<ChatMessage>, ApiClientError>;

    async fn delete_thread(&self, thread_id: ThreadId) -> Result<(), ApiClientError>;

    async fn set_scholarship_saved(
        &self,
        scholarship_id: ScholarshipId,
        saved: bool,
    ) -> Result<(), ApiClientError>;

    async fn update_application(
        &self,
        application_id: ApplicationId,
        form: &ApplicationUpdateForm,
    ) -> Result<Application, ApiClientError>;

    async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedFile, ApiClientError>;
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(config: &ScholarisConfig) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let auth_header = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        let response = self
            .client
            .get(self.url(path))
            .headers(self.auth_header.clone())
            .send()
            .await?;
        let envelope = self.parse_response(response).await?;
        Ok(envelope.decode_payload()?)
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.url(path))
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await?;
        let envelope = self.parse_response(response).await?;
        Ok(envelope.decode_payload()?)
    }

    async fn put_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .put(self.url(path))
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await?;
        let envelope = self.parse_response(response).await?;
        Ok(envelope.decode_payload()?)
    }

    /// POST where only the success flag matters.
    async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiClientError> {
        let response = self
            .client
            .post(self.url(path))
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await?;
        self.parse_response(response).await?.into_result()?;
        Ok(())
    }

    async fn delete_ack(&self, path: &str) -> Result<(), ApiClientError> {
        let response = self
            .client
            .delete(self.url(path))
            .headers(self.auth_header.clone())
            .send()
            .await?;
        self.parse_response(response).await?.into_result()?;
        Ok(())
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<Value>, ApiClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<ApiEnvelope<Value>>().await?)
        } else {
            let text = response.text().await?;
            if let Ok(envelope) = serde_json::from_str::<ApiEnvelope<Value>>(&text) {
                if let Some(message) = envelope.message {
                    return Err(ApiError::Rejected { message }.into());
                }
            }
            Err(ApiClientError::InvalidResponse(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )))
        }
    }
}

#[async_trait]
impl ScholarisApi for RestClient {
    async fn fetch_value(&self, path: &str) -> Result<Value, ApiClientError> {
        self.get_json(path).await
    }

    async fn react_to_post(&self, post_id: PostId, kind: ReactionKind) -> Result<Post, ApiClientError> {
        let path = format!("/api/posts/{}/reactions", post_id.as_uuid());
        self.post_json(&path, &json!({ "kind": kind })).await
    }

    async fn set_post_saved(&self, post_id: PostId, saved: bool) -> Result<(), ApiClientError> {
        let path = format!("/api/posts/{}/save", post_id.as_uuid());
        self.post_ack(&path, &json!({ "saved": saved })).await
    }

    async fn create_post(&self, form: &PostForm) -> Result<Post, ApiClientError> {
        self.post_json("/api/posts", form).await
    }

    async fn create_comment(&self, post_id: PostId, form: &CommentForm) -> Result<Comment, ApiClientError> {
        let path = format!("/api/posts/{}/comments", post_id.as_uuid());
        self.post_json(&path, form).await
    }

    async fn delete_comment(
        &self,
        post_id: PostId,
        comment_id: CommentId,
    ) -> Result<(), ApiClientError> {
        let path = format!(
            "/api/posts/{}/comments/{}",
            post_id.as_uuid(),
            comment_id.as_uuid()
        );
        self.delete_ack(&path).await
    }

    async fn delete_post(&self, post_id: PostId) -> Result<(), ApiClientError> {
        self.delete_ack(&format!("/api/posts/{}", post_id.as_uuid())).await
    }

    async fn send_chat_message(
        &self,
        thread_id: ThreadId,
        prompt: &ChatPrompt,
    ) -> Result<Vec<ChatMessage>, ApiClientError> {
        let path = format!("/api/chat/threads/{}/messages", thread_id.as_uuid());
        self.post_json(&path, prompt).await
    }

    async fn delete_thread(&self, thread_id: ThreadId) -> Result<(), ApiClientError> {
        self.delete_ack(&format!("/api/chat/threads/{}", thread_id.as_uuid()))
            .await
    }

    async fn set_scholarship_saved(
        &self,
        scholarship_id: ScholarshipId,
        saved: bool,
    ) -> Result<(), ApiClientError> {
        let path = format!("/api/scholarships/{}/save", scholarship_id.as_uuid());
        self.post_ack(&path, &json!({ "saved": saved })).await
    }

    async fn update_application(
        &self,
        application_id: ApplicationId,
        form: &ApplicationUpdateForm,
    ) -> Result<Application, ApiClientError> {
        let path = format!("/api/applications/{}", application_id.as_uuid());
        self.put_json(&path, form).await
    }

    /// Upload one file as multipart/form-data.
    async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedFile, ApiClientError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/api/uploads"))
            .headers(self.auth_header.clone())
            .multipart(form)
            .send()
            .await?;
        let envelope = self.parse_response(response).await?;
        Ok(envelope.decode_payload()?)
    }
}

/// Loads query keys from their REST resource.
pub struct ApiQueryFetcher<A> {
    api: Arc<A>,
}

impl<A> ApiQueryFetcher<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<A: ScholarisApi> QueryFetcher for ApiQueryFetcher<A> {
    async fn fetch(&self, key: &QueryKey) -> CacheResult<Value> {
        let path = keys::resource_path(key).ok_or_else(|| CacheError::Fetch {
            key: key.clone(),
            reason: "no REST resource for key".to_string(),
        })?;
        self.api
            .fetch_value(&path)
            .await
            .map_err(|e| CacheError::Fetch {
                key: key.clone(),
                reason: e.to_string(),
            })
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    if let Some(jwt) = &auth.jwt {
        let value = format!("Bearer {}", jwt);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_headers_carry_both_credentials() {
        let auth = AuthConfig {
            api_key: Some("key-1".to_string()),
            jwt: Some("jwt-1".to_string()),
        };
        let headers = build_auth_headers(&auth).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "key-1");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer jwt-1");
    }

    #[test]
    fn test_auth_header_rejects_control_characters() {
        let auth = AuthConfig {
            api_key: Some("bad\nkey".to_string()),
            jwt: None,
        };
        assert!(matches!(
            build_auth_headers(&auth),
            Err(ApiClientError::Config(_))
        ));
    }

    #[test]
    fn test_envelope_rejection_maps_to_rejected_mutation() {
        let err: MutationError = ApiClientError::Api(ApiError::Rejected {
            message: "Post not found".to_string(),
        })
        .into();
        assert_eq!(err, MutationError::rejected("Post not found"));
    }

    #[test]
    fn test_bad_status_maps_to_transport() {
        let err: MutationError =
            ApiClientError::InvalidResponse("HTTP 502: bad gateway".to_string()).into();
        assert!(matches!(err, MutationError::Transport { .. }));
    }

    #[test]
    fn test_missing_payload_maps_to_malformed() {
        let err: MutationError = ApiClientError::Api(ApiError::MissingPayload).into();
        assert!(matches!(err, MutationError::MalformedResponse { .. }));
    }
}
