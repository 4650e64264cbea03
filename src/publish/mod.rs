//! Publisher capability interface and registry.
//!
//! Every external surface sits behind the same one-operation trait. Adding
//! a platform means writing one adapter and registering it; the
//! orchestrator's dispatch loop only ever iterates the registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ContentRequest, GeneratedContent, Platform, RenderedVideo};

/// Everything a publisher may read for one run. Shared immutably across
/// the concurrent per-platform tasks; publishers never write to it.
#[derive(Debug)]
pub struct PublishBundle {
    pub request: ContentRequest,
    pub content: Arc<GeneratedContent>,
    pub video: Option<RenderedVideo>,
}

impl PublishBundle {
    /// Title to post under: the uploader's, or one derived from the content.
    pub fn title(&self) -> String {
        self.request
            .title
            .clone()
            .unwrap_or_else(|| self.content.blog.title.clone())
    }
}

/// Platform reference returned on success.
#[derive(Debug, Clone, Default)]
pub struct PublishReceipt {
    pub post_id: Option<String>,
    pub url: Option<String>,
}

/// How a publish attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    /// Credentials rejected. Fatal; never retried automatically.
    Auth,

    /// Network-level or service-side failure. Retryable.
    Transient,

    /// The platform rejected the content itself. Fatal; the content would
    /// have to be regenerated.
    ContentRejected,
}

/// Failure of one platform's publish call. Never aborts sibling platforms.
#[derive(Debug, Clone, Error)]
#[error("{platform} publish failed ({kind:?}): {message}")]
pub struct PublishError {
    pub platform: Platform,
    pub kind: PublishErrorKind,
    pub message: String,
}

impl PublishError {
    pub fn auth(platform: Platform, message: impl Into<String>) -> Self {
        Self {
            platform,
            kind: PublishErrorKind::Auth,
            message: message.into(),
        }
    }

    pub fn transient(platform: Platform, message: impl Into<String>) -> Self {
        Self {
            platform,
            kind: PublishErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn rejected(platform: Platform, message: impl Into<String>) -> Self {
        Self {
            platform,
            kind: PublishErrorKind::ContentRejected,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == PublishErrorKind::Transient
    }

    /// Classify an HTTP response status the way the token APIs behave:
    /// 401/403 auth, 429 and 5xx transient, any other 4xx content-rejected.
    pub fn from_status(platform: Platform, status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => PublishErrorKind::Auth,
            429 => PublishErrorKind::Transient,
            s if s >= 500 => PublishErrorKind::Transient,
            _ => PublishErrorKind::ContentRejected,
        };
        Self {
            platform,
            kind,
            message: format!("HTTP {}: {}", status, body.into()),
        }
    }

    /// Wrap a client-side reqwest failure (connect, timeout) as transient.
    pub fn from_reqwest(platform: Platform, err: reqwest::Error) -> Self {
        Self::transient(platform, err.to_string())
    }
}

/// One external publishing surface.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The platform this publisher serves.
    fn platform(&self) -> Platform;

    /// Whether this publisher needs a rendered video in the bundle.
    fn requires_video(&self) -> bool {
        self.platform().requires_video()
    }

    /// Submit the content. Exactly one terminal result per call; bounded
    /// retries for transient failures happen in the dispatch loop, not here.
    async fn publish(&self, bundle: &PublishBundle) -> Result<PublishReceipt, PublishError>;
}

/// The set of configured publishers, keyed by platform.
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(publisher.platform(), publisher);
    }

    pub fn with(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.register(publisher);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Publisher>> {
        self.publishers.get(&platform).cloned()
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let auth = PublishError::from_status(Platform::SocialImage, 401, "nope");
        assert_eq!(auth.kind, PublishErrorKind::Auth);
        assert!(!auth.is_retryable());

        let limited = PublishError::from_status(Platform::SocialImage, 429, "slow down");
        assert!(limited.is_retryable());

        let down = PublishError::from_status(Platform::SocialVideo, 503, "maintenance");
        assert!(down.is_retryable());

        let rejected = PublishError::from_status(Platform::Blog, 422, "too long");
        assert_eq!(rejected.kind, PublishErrorKind::ContentRejected);
        assert!(!rejected.is_retryable());
    }

    struct NullPublisher(Platform);

    #[async_trait]
    impl Publisher for NullPublisher {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn publish(&self, _bundle: &PublishBundle) -> Result<PublishReceipt, PublishError> {
            Ok(PublishReceipt::default())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PublisherRegistry::new()
            .with(Arc::new(NullPublisher(Platform::Blog)))
            .with(Arc::new(NullPublisher(Platform::SocialImage)));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(Platform::Blog).is_some());
        assert!(registry.get(Platform::SocialVideo).is_none());
    }
}
