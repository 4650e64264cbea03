//! Blog platform adapter.
//!
//! The blog surface has no clean token API: publishing means logging in
//! with a username/password form, holding the session cookie, and
//! submitting the post through the editor endpoint. The client keeps a
//! cookie jar for the session; a fresh login happens per publish call so
//! a worker restart never depends on leftover session state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::Platform;
use crate::publish::{PublishBundle, PublishError, Publisher, PublishReceipt};

/// Blog account credentials.
#[derive(Debug, Clone)]
pub struct BlogCredentials {
    pub username: String,
    pub password: String,
}

impl BlogCredentials {
    /// Load from BLOG_USERNAME / BLOG_PASSWORD.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            username: std::env::var("BLOG_USERNAME")
                .context("BLOG_USERNAME environment variable required")?,
            password: std::env::var("BLOG_PASSWORD")
                .context("BLOG_PASSWORD environment variable required")?,
        })
    }
}

/// Session-based blog publisher.
pub struct BlogPublisher {
    base_url: String,
    credentials: BlogCredentials,
    client: reqwest::Client,
}

/// Response from the post submission endpoint.
#[derive(Debug, Deserialize)]
struct PostResponse {
    #[serde(default)]
    post_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl BlogPublisher {
    pub fn new(base_url: impl Into<String>, credentials: BlogCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("failed to build blog HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Form login; the session cookie lands in the client's jar.
    async fn login(&self) -> Result<(), PublishError> {
        let response = self
            .client
            .post(self.url("login"))
            .form(&[
                ("id", self.credentials.username.as_str()),
                ("pw", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::Blog, e))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(PublishError::auth(Platform::Blog, "login rejected"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(
                Platform::Blog,
                status.as_u16(),
                body,
            ));
        }

        // Some blog frontends answer 200 with an error page instead of a
        // status code; the failure marker is in the body.
        let body = response
            .text()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::Blog, e))?;
        if body.contains("login_failed") || body.contains("Login failed") {
            return Err(PublishError::auth(
                Platform::Blog,
                "login page reported failure",
            ));
        }

        debug!("blog session established");
        Ok(())
    }

    async fn submit_post(&self, bundle: &PublishBundle) -> Result<PublishReceipt, PublishError> {
        let mut form = Form::new()
            .text("title", bundle.title())
            .text("content", bundle.content.blog.to_html());

        for image in &bundle.request.images {
            let bytes = image.read_bytes().await.map_err(|e| {
                PublishError::rejected(
                    Platform::Blog,
                    format!("cannot read image {}: {}", image.file_name(), e),
                )
            })?;

            let part = Part::bytes(bytes)
                .file_name(image.file_name())
                .mime_str(image.mime_type().unwrap_or("application/octet-stream"))
                .map_err(|e| PublishError::rejected(Platform::Blog, e.to_string()))?;
            form = form.part("images[]", part);
        }

        let response = self
            .client
            .post(self.url("posts"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::Blog, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(
                Platform::Blog,
                status.as_u16(),
                body,
            ));
        }

        let parsed: PostResponse = response
            .json()
            .await
            .map_err(|e| PublishError::from_reqwest(Platform::Blog, e))?;

        Ok(PublishReceipt {
            post_id: parsed.post_id,
            url: parsed.url,
        })
    }
}

#[async_trait]
impl Publisher for BlogPublisher {
    fn platform(&self) -> Platform {
        Platform::Blog
    }

    async fn publish(&self, bundle: &PublishBundle) -> Result<PublishReceipt, PublishError> {
        self.login().await?;
        let receipt = self.submit_post(bundle).await?;
        info!(url = receipt.url.as_deref().unwrap_or("-"), "blog post published");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> BlogPublisher {
        BlogPublisher::new(
            "https://blog.example.com/",
            BlogCredentials {
                username: "florist".to_string(),
                password: "secret".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_url_joining_strips_slashes() {
        let p = publisher();
        assert_eq!(p.url("login"), "https://blog.example.com/login");
        assert_eq!(p.url("/posts"), "https://blog.example.com/posts");
    }

    #[test]
    fn test_platform_identity() {
        assert_eq!(publisher().platform(), Platform::Blog);
        assert!(!publisher().requires_video());
    }
}
