//! Generated content artifacts: blog article, social caption, video.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One section of a blog article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogSection {
    pub heading: String,
    pub body: String,
}

/// Long-form article shaped for the blog platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogArticle {
    pub title: String,
    pub sections: Vec<BlogSection>,
}

impl BlogArticle {
    /// Render to the simple HTML the blog editor accepts.
    pub fn to_html(&self) -> String {
        let mut html = format!("<h1>{}</h1>\n", self.title);
        for section in &self.sections {
            html.push_str(&format!("<h2>{}</h2>\n", section.heading));
            for paragraph in section.body.split("\n\n") {
                html.push_str(&format!("<p>{}</p>\n", paragraph.trim()));
            }
        }
        html
    }

    /// Render to plain text (status output, artifacts on disk).
    pub fn to_text(&self) -> String {
        let mut text = format!("{}\n\n", self.title);
        for section in &self.sections {
            text.push_str(&format!("## {}\n{}\n\n", section.heading, section.body));
        }
        text
    }
}

/// Text artifacts derived from one AnalysisResult, keyed by platform shape.
///
/// Produced exactly once per run; publishers read it but never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub blog: BlogArticle,

    /// Short caption for social posts
    pub caption: String,

    /// Normalized, deduplicated, bounded hashtag set (without '#')
    pub hashtags: Vec<String>,
}

impl GeneratedContent {
    /// Caption plus hashtag block, as posted to the image platform.
    pub fn caption_with_hashtags(&self) -> String {
        if self.hashtags.is_empty() {
            return self.caption.clone();
        }
        let tags: Vec<String> = self.hashtags.iter().map(|t| format!("#{}", t)).collect();
        format!("{}\n\n{}", self.caption, tags.join(" "))
    }
}

/// A rendered video artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedVideo {
    /// Output file on disk (inside the run's artifacts directory)
    pub path: PathBuf,

    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,

    /// Container format, e.g. "mp4"
    pub format: String,
}
