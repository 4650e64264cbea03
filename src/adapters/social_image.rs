//! Social image platform adapter (graph-style token API).
//!
//! Publishing is a three-step flow: upload each image into a media
//! container, wrap multiple containers in a carousel, then publish the
//! container. The caption (with hashtag block) rides on the container that
//! gets published.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;

use crate::domain::Platform;
use crate::publish::{PublishBundle, PublishError, Publisher, PublishReceipt};

/// Token + account pair for the image API.
#[derive(Debug, Clone)]
pub struct SocialImageCredentials {
    pub access_token: String,
    pub account_id: String,
}

impl SocialImageCredentials {
    /// Load from SOCIAL_IMAGE_TOKEN / SOCIAL_IMAGE_ACCOUNT_ID.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            access_token: std::env::var("SOCIAL_IMAGE_TOKEN")
                .context("SOCIAL_IMAGE_TOKEN environment variable required")?,
            account_id: std::env::var("SOCIAL_IMAGE_ACCOUNT_ID")
                .context("SOCIAL_IMAGE_ACCOUNT_ID environment variable required")?,
        })
    }
}

/// Token-authenticated image publisher.
pub struct SocialImagePublisher {
    base_url: String,
    credentials: SocialImageCredentials,
    client: reqwest::Client,
}

/// Container / publish response envelope.
#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: String,
    #[serde(default)]
    permalink: Option<String>,
}

impl SocialImagePublisher {
    pub fn new(base_url: impl Into<String>, credentials: SocialImageCredentials) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client: reqwest::Client::new(),
        }
    }

    fn account_url(&self, suffix: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.credentials.account_id, suffix)
    }

    async fn parse_media_response(
        &self,
        response: reqwest::Response,
    ) -> Result<MediaResponse, PublishError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(
                Platform::SocialImage,
                status.as_u16(),
                body,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialImage, e))
    }

    /// Upload one image into a media container.
    async fn upload_container(
        &self,
        bundle: &PublishBundle,
        image_index: usize,
        carousel_item: bool,
    ) -> Result<String, PublishError> {
        let image = &bundle.request.images[image_index];
        let bytes = image.read_bytes().await.map_err(|e| {
            PublishError::rejected(
                Platform::SocialImage,
                format!("cannot read image {}: {}", image.file_name(), e),
            )
        })?;

        let part = Part::bytes(bytes)
            .file_name(image.file_name())
            .mime_str(image.mime_type().unwrap_or("application/octet-stream"))
            .map_err(|e| PublishError::rejected(Platform::SocialImage, e.to_string()))?;

        let mut form = Form::new().part("image", part);
        if carousel_item {
            form = form.text("is_carousel_item", "true");
        } else {
            form = form.text("caption", bundle.content.caption_with_hashtags());
        }

        let response = self
            .client
            .post(self.account_url("media"))
            .bearer_auth(&self.credentials.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialImage, e))?;

        Ok(self.parse_media_response(response).await?.id)
    }

    /// Wrap child containers in a carousel container carrying the caption.
    async fn create_carousel(
        &self,
        bundle: &PublishBundle,
        children: &[String],
    ) -> Result<String, PublishError> {
        let response = self
            .client
            .post(self.account_url("media"))
            .bearer_auth(&self.credentials.access_token)
            .json(&serde_json::json!({
                "media_type": "CAROUSEL",
                "children": children,
                "caption": bundle.content.caption_with_hashtags(),
            }))
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialImage, e))?;

        Ok(self.parse_media_response(response).await?.id)
    }

    async fn publish_container(&self, container_id: &str) -> Result<MediaResponse, PublishError> {
        let response = self
            .client
            .post(self.account_url("media_publish"))
            .bearer_auth(&self.credentials.access_token)
            .json(&serde_json::json!({ "creation_id": container_id }))
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::SocialImage, e))?;

        self.parse_media_response(response).await
    }
}

#[async_trait]
impl Publisher for SocialImagePublisher {
    fn platform(&self) -> Platform {
        Platform::SocialImage
    }

    async fn publish(&self, bundle: &PublishBundle) -> Result<PublishReceipt, PublishError> {
        let image_count = bundle.request.images.len();
        if image_count == 0 {
            return Err(PublishError::rejected(
                Platform::SocialImage,
                "no images in request",
            ));
        }

        let carousel = image_count > 1;
        let mut containers = Vec::with_capacity(image_count);
        for index in 0..image_count {
            containers.push(self.upload_container(bundle, index, carousel).await?);
        }

        let container_id = if carousel {
            self.create_carousel(bundle, &containers).await?
        } else {
            containers.remove(0)
        };

        let published = self.publish_container(&container_id).await?;
        info!(post_id = %published.id, "social image post published");

        Ok(PublishReceipt {
            url: published.permalink,
            post_id: Some(published.id),
        })
    }
}
