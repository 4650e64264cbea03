//! Flower image analysis via a vision-capable AI service.
//!
//! One JSON request per image carrying a base64 image block and an
//! extraction prompt; the model answers with a JSON object of flower
//! attributes. Per-image findings are aggregated by the domain layer.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::retry::RetryPolicy;
use crate::domain::{AnalysisResult, ImageAttributes, ImageSource};

/// Extraction prompt sent with every image.
const ANALYSIS_PROMPT: &str = "Analyze this flower photograph. Respond with only a JSON object \
containing: \"species\" (object with \"common\" and \"scientific\" names), \"colors\" (array of \
dominant colors), \"meanings\" (array of symbolic meanings), \"season\" (single season tag), \
\"care_tips\" (short care advice string), \"gift_occasions\" (array of suitable occasions).";

/// Errors from image analysis. Fatal to the run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no images to analyze")]
    NoImages,

    #[error("unsupported image format: {0}")]
    UnsupportedImage(String),

    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: String,
        source: std::io::Error,
    },

    #[error("analysis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analysis service returned HTTP {0}")]
    Status(u16),

    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

impl AnalysisError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Network-level failures, rate limits and 5xx are transient; malformed
    /// responses and bad input are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AnalysisError::Status(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Capability interface for the analysis stage.
#[async_trait]
pub trait FlowerAnalyzer: Send + Sync {
    async fn analyze(&self, images: &[ImageSource]) -> Result<AnalysisResult, AnalysisError>;
}

/// HTTP client for the vision service.
pub struct VisionClient {
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

/// Response envelope from the vision service.
#[derive(Debug, Deserialize)]
struct VisionResponse {
    content: Vec<VisionContentBlock>,
}

#[derive(Debug, Deserialize)]
struct VisionContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl VisionClient {
    pub fn new(endpoint: String, api_key: String, model: String, retry: RetryPolicy) -> Self {
        Self {
            endpoint,
            api_key,
            model,
            retry,
            client: reqwest::Client::new(),
        }
    }

    /// Analyze one image, without retry.
    async fn request_attributes(
        &self,
        mime_type: &str,
        image_bytes: &[u8],
    ) -> Result<ImageAttributes, AnalysisError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": ANALYSIS_PROMPT },
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": mime_type,
                            "data": BASE64.encode(image_bytes),
                        }
                    }
                ]
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status.as_u16()));
        }

        let envelope: VisionResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

        let text = envelope
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .ok_or_else(|| AnalysisError::Malformed("no text block in response".to_string()))?;

        parse_attributes(text)
    }

    /// Analyze one image with transient-failure retry.
    async fn analyze_image(&self, image: &ImageSource) -> Result<ImageAttributes, AnalysisError> {
        let mime_type = image
            .mime_type()
            .ok_or_else(|| AnalysisError::UnsupportedImage(image.file_name()))?;

        let bytes = image
            .read_bytes()
            .await
            .map_err(|source| AnalysisError::ImageRead {
                path: image.path.display().to_string(),
                source,
            })?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.request_attributes(mime_type, &bytes).await {
                Ok(attributes) => {
                    debug!(image = %image.file_name(), species = %attributes.species.common, "image analyzed");
                    return Ok(attributes);
                }
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        image = %image.file_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "analysis attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FlowerAnalyzer for VisionClient {
    async fn analyze(&self, images: &[ImageSource]) -> Result<AnalysisResult, AnalysisError> {
        if images.is_empty() {
            return Err(AnalysisError::NoImages);
        }

        // Reject unsupported formats before spending any network calls.
        for image in images {
            if image.mime_type().is_none() {
                return Err(AnalysisError::UnsupportedImage(image.file_name()));
            }
        }

        let mut per_image = Vec::with_capacity(images.len());
        for image in images {
            per_image.push(self.analyze_image(image).await?);
        }

        Ok(AnalysisResult::from_images(per_image))
    }
}

/// Extract and parse the JSON object embedded in the model's text answer.
///
/// The model is asked for bare JSON but may wrap it in prose or a code
/// fence; take the outermost brace-delimited span.
fn parse_attributes(text: &str) -> Result<ImageAttributes, AnalysisError> {
    let start = text
        .find('{')
        .ok_or_else(|| AnalysisError::Malformed("no JSON object in response".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| AnalysisError::Malformed("unterminated JSON object".to_string()))?;

    serde_json::from_str(&text[start..=end])
        .map_err(|e| AnalysisError::Malformed(e.to_string()))
}
