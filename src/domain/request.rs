//! Content requests and target platforms.
//!
//! A ContentRequest is the immutable input to one pipeline run: a batch of
//! flower photos plus minimal metadata and the set of platforms to publish to.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// External publishing surfaces supported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Long-form blog post (session-based submission)
    Blog,

    /// Image post with caption + hashtags (token API)
    SocialImage,

    /// Short-form vertical video (token API, resumable upload)
    SocialVideo,
}

impl Platform {
    /// All known platforms, in dispatch order.
    pub const ALL: [Platform; 3] = [Platform::Blog, Platform::SocialImage, Platform::SocialVideo];

    /// Whether publishing to this platform needs a rendered video.
    pub fn requires_video(&self) -> bool {
        matches!(self, Platform::SocialVideo)
    }

    /// Stable identifier used in logs and serialized state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Blog => "blog",
            Platform::SocialImage => "social_image",
            Platform::SocialVideo => "social_video",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blog" => Ok(Platform::Blog),
            "social_image" | "social-image" => Ok(Platform::SocialImage),
            "social_video" | "social-video" => Ok(Platform::SocialVideo),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// A single input image, referenced by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Path to the image file
    pub path: PathBuf,
}

impl ImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File name component, for upload forms and logs.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string())
    }

    /// MIME type derived from the file extension.
    ///
    /// Returns None for extensions the analysis service does not accept.
    pub fn mime_type(&self) -> Option<&'static str> {
        let ext = self.path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            _ => None,
        }
    }

    /// Read the image bytes from disk.
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl AsRef<Path> for ImageSource {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Immutable input to one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    /// Post title; a generated one is used when absent
    pub title: Option<String>,

    /// Optional free-form description from the uploader
    pub description: Option<String>,

    /// Ordered image batch (order drives video sequencing)
    pub images: Vec<ImageSource>,

    /// Platforms to publish to
    pub platforms: Vec<Platform>,
}

impl ContentRequest {
    pub fn new(images: Vec<ImageSource>, platforms: Vec<Platform>) -> Self {
        Self {
            title: None,
            description: None,
            images,
            platforms,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether any selected platform needs a rendered video.
    pub fn wants_video(&self) -> bool {
        self.platforms.iter().any(|p| p.requires_video())
    }

    /// Validate the request at acceptance time.
    pub fn validate(&self) -> Result<(), String> {
        if self.images.is_empty() {
            return Err("request must include at least one image".to_string());
        }
        if self.platforms.is_empty() {
            return Err("request must select at least one platform".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.platforms {
            if !seen.insert(*p) {
                return Err(format!("platform '{}' selected twice", p));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parsing() {
        assert_eq!("blog".parse::<Platform>().unwrap(), Platform::Blog);
        assert_eq!(
            "social_video".parse::<Platform>().unwrap(),
            Platform::SocialVideo
        );
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_only_video_platform_requires_video() {
        assert!(!Platform::Blog.requires_video());
        assert!(!Platform::SocialImage.requires_video());
        assert!(Platform::SocialVideo.requires_video());
    }

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(
            ImageSource::new("rose.JPG").mime_type(),
            Some("image/jpeg")
        );
        assert_eq!(ImageSource::new("rose.webp").mime_type(), Some("image/webp"));
        assert_eq!(ImageSource::new("rose.gif").mime_type(), None);
        assert_eq!(ImageSource::new("rose").mime_type(), None);
    }

    #[test]
    fn test_request_validation() {
        let ok = ContentRequest::new(
            vec![ImageSource::new("a.jpg")],
            vec![Platform::Blog, Platform::SocialImage],
        );
        assert!(ok.validate().is_ok());

        let no_images = ContentRequest::new(vec![], vec![Platform::Blog]);
        assert!(no_images.validate().is_err());

        let no_platforms = ContentRequest::new(vec![ImageSource::new("a.jpg")], vec![]);
        assert!(no_platforms.validate().is_err());

        let dup = ContentRequest::new(
            vec![ImageSource::new("a.jpg")],
            vec![Platform::Blog, Platform::Blog],
        );
        assert!(dup.validate().is_err());
    }
}
