//! File uploads and posts with attached media.

use crate::api_client::ScholarisApi;
use crate::client::ScholarisClient;
use crate::error::{ClientError, ClientResult};
use crate::notifications::{Notification, NotificationAction, NotificationLevel};
use scholaris_core::{Post, PostForm, UploadValidation, UploadedFile};

/// A file picked by the user, not yet sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl<A: ScholarisApi + 'static> ScholarisClient<A> {
    /// Check a file against the configured limits.
    pub fn validate_upload(&self, file_name: &str, content_type: &str, size: u64) -> UploadValidation {
        self.upload_policy.validate(file_name, content_type, size)
    }

    /// Validate and upload `request`. Nothing is sent when validation fails.
    pub async fn upload_file(&self, request: UploadRequest) -> ClientResult<UploadedFile> {
        let check = self.validate_upload(&request.file_name, &request.content_type, request.size());
        if !check.valid {
            let reason = check.error.unwrap_or_else(|| "file rejected".to_string());
            return Err(ClientError::Upload(reason));
        }

        let file_name = request.file_name.clone();
        match self
            .api
            .upload_file(&request.file_name, &request.content_type, request.bytes)
            .await
        {
            Ok(uploaded) => {
                tracing::debug!(file = %file_name, url = %uploaded.url, "Upload complete");
                Ok(uploaded)
            }
            Err(err) => {
                tracing::warn!(file = %file_name, error = %err, "Upload failed");
                self.notifications.push(
                    Notification::new(
                        NotificationLevel::Error,
                        format!("Could not upload {}: {}", file_name, err),
                    )
                    .with_action(NotificationAction::Retry),
                );
                Err(err.into())
            }
        }
    }

    /// Publish a post with an optional attachment.
    ///
    /// The text is validated before the upload starts, and the post is only
    /// created once the upload succeeded.
    pub async fn create_post_with_media(
        &self,
        content: &str,
        attachment: Option<UploadRequest>,
    ) -> ClientResult<Post> {
        let mut form = PostForm::new(content, None)?;
        if let Some(request) = attachment {
            let uploaded = self.upload_file(request).await?;
            form.media_url = Some(uploaded.url);
        }
        self.create_post(form).await
    }
}
