//! Social video platform adapter (token API, resumable upload).
//!
//! Uploads go through a resumable session: init with metadata, send the
//! file in fixed-size chunks with Content-Range headers, finalize. The
//! server answers 308 for an accepted-but-incomplete chunk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::Platform;
use crate::publish::{PublishBundle, PublishError, Publisher, PublishReceipt};

/// Upload chunk size: 8 MiB.
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Bearer token for the video API.
#[derive(Debug, Clone)]
pub struct SocialVideoCredentials {
    pub access_token: String,
}

impl SocialVideoCredentials {
    /// Load from SOCIAL_VIDEO_TOKEN.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            access_token: std::env::var("SOCIAL_VIDEO_TOKEN")
                .context("SOCIAL_VIDEO_TOKEN environment variable required")?,
        })
    }
}

/// Token-authenticated resumable video publisher.
pub struct SocialVideoPublisher {
    base_url: String,
    credentials: SocialVideoCredentials,
    client: reqwest::Client,
    chunk_size: usize,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    upload_id: String,
}

#[derive(Debug, Deserialize)]
struct FinalizeResponse {
    video_id: String,
    #[serde(default)]
    url: Option<String>,
}

impl SocialVideoPublisher {
    pub fn new(base_url: impl Into<String>, credentials: SocialVideoCredentials) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client: reqwest::Client::new(),
            chunk_size: CHUNK_SIZE,
        }
    }

    #[cfg(test)]
    fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        allow_resume_ack: bool,
    ) -> Result<reqwest::Response, PublishError> {
        let status = response.status();
        if status.is_success() || (allow_resume_ack && status.as_u16() == 308) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::from_status(
            Platform::SocialVideo,
            status.as_u16(),
            body,
        ))
    }

    async fn init_session(
        &self,
        bundle: &PublishBundle,
        file_size: u64,
    ) -> Result<String, PublishError> {
        let response = self
            .client
            .post(self.url("uploads/init"))
            .bearer_auth(&self.credentials.access_token)
            .json(&serde_json::json!({
                "title": bundle.title(),
                "description": bundle.content.caption_with_hashtags(),
                "tags": bundle.content.hashtags,
                "file_size": file_size,
            }))
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialVideo, e))?;

        let response = self.check_status(response, false).await?;
        let init: InitResponse = response
            .json()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialVideo, e))?;

        Ok(init.upload_id)
    }

    async fn upload_chunks(&self, upload_id: &str, bytes: &[u8]) -> Result<(), PublishError> {
        let total = bytes.len();
        for (start, end) in chunk_ranges(total, self.chunk_size) {
            let response = self
                .client
                .put(self.url(&format!("uploads/{}", upload_id)))
                .bearer_auth(&self.credentials.access_token)
                .header("Content-Range", content_range(start, end, total))
                .body(bytes[start..end].to_vec())
                .send()
                .await
                .map_err(|e| PublishError::from_reqwest(Platform::SocialVideo, e))?;

            self.check_status(response, true).await?;
            debug!(upload_id, start, end, total, "chunk uploaded");
        }

        Ok(())
    }

    async fn finalize(&self, upload_id: &str) -> Result<FinalizeResponse, PublishError> {
        let response = self
            .client
            .post(self.url(&format!("uploads/{}/finalize", upload_id)))
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialVideo, e))?;

        let response = self.check_status(response, false).await?;
        response
            .json()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialVideo, e))
    }
}

#[async_trait]
impl Publisher for SocialVideoPublisher {
    fn platform(&self) -> Platform {
        Platform::SocialVideo
    }

    async fn publish(&self, bundle: &PublishBundle) -> Result<PublishReceipt, PublishError> {
        let video = bundle.video.as_ref().ok_or_else(|| {
            PublishError::rejected(Platform::SocialVideo, "no rendered video available")
        })?;

        let bytes = tokio::fs::read(&video.path).await.map_err(|e| {
            PublishError::rejected(
                Platform::SocialVideo,
                format!("cannot read video {}: {}", video.path.display(), e),
            )
        })?;

        let upload_id = self.init_session(bundle, bytes.len() as u64).await?;
        self.upload_chunks(&upload_id, &bytes).await?;
        let finalized = self.finalize(&upload_id).await?;

        info!(video_id = %finalized.video_id, "social video published");

        Ok(PublishReceipt {
            url: finalized.url,
            post_id: Some(finalized.video_id),
        })
    }
}

/// Split a byte count into half-open chunk ranges.
fn chunk_ranges(total: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    if total == 0 {
        return vec![(0, 0)];
    }
    (0..total)
        .step_by(chunk_size.max(1))
        .map(|start| (start, (start + chunk_size).min(total)))
        .collect()
}

/// Content-Range header value for one chunk (inclusive byte range).
fn content_range(start: usize, end: usize, total: usize) -> String {
    format!("bytes {}-{}/{}", start, end.saturating_sub(1), total)
}
