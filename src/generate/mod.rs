//! Content generation: analysis attributes in, platform-shaped text out.
//!
//! A pure transform: same AnalysisResult, same output. All the variability
//! of a run lives in the analysis stage; everything after it is
//! reproducible.

use thiserror::Error;

use crate::domain::{
    AggregatedAttributes, AnalysisResult, BlogArticle, BlogSection, GeneratedContent,
};

/// Upper bound on the hashtag set (platform limit).
pub const MAX_HASHTAGS: usize = 30;

/// Caption length bound, in characters.
const MAX_CAPTION_CHARS: usize = 300;

/// Hashtags appended to every post, after the derived ones.
const BASE_HASHTAGS: [&str; 6] = [
    "flowers",
    "flowerstagram",
    "florist",
    "flowershop",
    "bloom",
    "floweroftheday",
];

/// Errors from content generation. With a valid AnalysisResult this stage
/// cannot fail.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("analysis produced no usable attributes")]
    EmptyAnalysis,
}

/// Derive all text artifacts from one analysis result.
pub fn generate(analysis: &AnalysisResult) -> Result<GeneratedContent, GenerationError> {
    if analysis.is_empty() {
        return Err(GenerationError::EmptyAnalysis);
    }

    let summary = &analysis.summary;

    Ok(GeneratedContent {
        blog: blog_article(summary),
        caption: caption(summary),
        hashtags: hashtags(summary),
    })
}

fn display_name(summary: &AggregatedAttributes) -> String {
    if summary.species.common.is_empty() {
        "These flowers".to_string()
    } else {
        summary.species.common.clone()
    }
}

/// Long-form article: headline plus sections, in a fixed order. Sections
/// without source data are omitted.
fn blog_article(summary: &AggregatedAttributes) -> BlogArticle {
    let name = display_name(summary);

    let title = match summary.meanings.first() {
        Some(meaning) => format!("{} — the flower of {}", name, meaning.to_lowercase()),
        None => format!("{} — a closer look", name),
    };

    let mut sections = Vec::new();

    let mut intro = format!("Today we are looking at {}.", name.to_lowercase());
    if !summary.species.scientific.is_empty() {
        intro.push_str(&format!(
            " Known botanically as {}, it is a favorite in our shop.",
            summary.species.scientific
        ));
    }
    if !summary.colors.is_empty() {
        intro.push_str(&format!(
            " The blooms in this batch show off {}.",
            join_naturally(&summary.colors)
        ));
    }
    sections.push(BlogSection {
        heading: "Introduction".to_string(),
        body: intro,
    });

    if !summary.meanings.is_empty() {
        sections.push(BlogSection {
            heading: "Meaning and symbolism".to_string(),
            body: format!(
                "In the language of flowers, {} stands for {}.",
                name.to_lowercase(),
                join_naturally(&summary.meanings)
            ),
        });
    }

    if !summary.season.is_empty() {
        let body = if summary.season == "mixed" {
            format!(
                "{} appears across several seasons, so you can enjoy it almost year-round.",
                name
            )
        } else {
            format!(
                "{} is at its best in {}. That is when you will find the fullest blooms.",
                name, summary.season
            )
        };
        sections.push(BlogSection {
            heading: "Season".to_string(),
            body,
        });
    }

    if let Some(care) = &summary.care_tips {
        sections.push(BlogSection {
            heading: "Care tips".to_string(),
            body: care.clone(),
        });
    }

    if !summary.gift_occasions.is_empty() {
        sections.push(BlogSection {
            heading: "When to gift it".to_string(),
            body: format!(
                "{} makes a wonderful gift for {}.",
                name,
                join_naturally(&summary.gift_occasions)
            ),
        });
    }

    sections.push(BlogSection {
        heading: "Closing".to_string(),
        body: format!(
            "Stop by the shop to see {} in person — we would love to put a bouquet together for you.",
            name.to_lowercase()
        ),
    });

    BlogArticle { title, sections }
}

/// Short emotive caption with a fixed call-to-action, bounded length.
fn caption(summary: &AggregatedAttributes) -> String {
    let name = display_name(summary);

    let mut caption = match (summary.colors.first(), summary.meanings.first()) {
        (Some(color), Some(meaning)) => format!(
            "{} {} — a little {} for your day.",
            color, name.to_lowercase(), meaning.to_lowercase()
        ),
        (Some(color), None) => format!("{} {} fresh in the shop.", color, name.to_lowercase()),
        (None, Some(meaning)) => format!(
            "{} — the flower of {}.",
            name,
            meaning.to_lowercase()
        ),
        (None, None) => format!("{} fresh in the shop.", name),
    };

    caption.push_str(" Wishing you a happy day!");

    truncate_chars(&caption, MAX_CAPTION_CHARS)
}

/// Hashtags from species, colors, meanings, season and occasions plus the
/// base set: lowercased, platform-legal characters only, case-insensitive
/// dedup, capped at MAX_HASHTAGS, derivation order preserved.
fn hashtags(summary: &AggregatedAttributes) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    candidates.push(summary.species.common.clone());
    candidates.push(summary.species.scientific.clone());
    candidates.extend(summary.colors.iter().cloned());
    candidates.extend(
        summary
            .colors
            .iter()
            .map(|c| format!("{} {}", c, summary.species.common)),
    );
    candidates.extend(summary.meanings.iter().cloned());
    if !summary.season.is_empty() && summary.season != "mixed" {
        candidates.push(summary.season.clone());
        candidates.push(format!("{} flowers", summary.season));
    }
    candidates.extend(summary.gift_occasions.iter().cloned());
    candidates.extend(BASE_HASHTAGS.iter().map(|t| t.to_string()));

    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();

    for candidate in candidates {
        let tag = normalize_hashtag(&candidate);
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.clone()) {
            tags.push(tag);
            if tags.len() == MAX_HASHTAGS {
                break;
            }
        }
    }

    tags
}

/// Lowercase and keep only [a-z0-9_]; spaces and hyphens collapse away.
fn normalize_hashtag(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

fn join_naturally(items: &[String]) -> String {
    match items.len() {
        0 => String::new(),
        1 => items[0].to_lowercase(),
        n => {
            let head: Vec<String> = items[..n - 1].iter().map(|s| s.to_lowercase()).collect();
            format!("{} and {}", head.join(", "), items[n - 1].to_lowercase())
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
