//! Flower attributes extracted by the vision service, and their aggregation.
//!
//! One `ImageAttributes` per input image; the pipeline works from the
//! aggregated summary, which reconciles disagreement between images.

use serde::{Deserialize, Serialize};

/// Species naming for one flower.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    /// Common name, e.g. "Rose"
    pub common: String,

    /// Scientific name, e.g. "Rosa", when the model provides one
    #[serde(default)]
    pub scientific: String,
}

/// Attributes extracted from a single image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageAttributes {
    pub species: Species,

    /// Dominant colors, as reported
    #[serde(default)]
    pub colors: Vec<String>,

    /// Symbolic meanings ("flower language")
    #[serde(default)]
    pub meanings: Vec<String>,

    /// Season tag, e.g. "spring"
    #[serde(default)]
    pub season: String,

    /// Care advice, when extracted
    #[serde(default)]
    pub care_tips: Option<String>,

    /// Occasions this flower suits as a gift
    #[serde(default)]
    pub gift_occasions: Vec<String>,
}

/// Summary reconciled across every image in a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedAttributes {
    pub species: Species,
    pub colors: Vec<String>,
    pub meanings: Vec<String>,
    pub season: String,
    pub care_tips: Option<String>,
    pub gift_occasions: Vec<String>,
}

/// Full analysis output for one run: per-image findings plus the summary.
///
/// Computed exactly once per run and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub per_image: Vec<ImageAttributes>,
    pub summary: AggregatedAttributes,
}

impl AnalysisResult {
    /// Build a result from per-image findings, computing the summary.
    pub fn from_images(per_image: Vec<ImageAttributes>) -> Self {
        let summary = aggregate(&per_image);
        Self { per_image, summary }
    }

    /// True when the model extracted nothing usable.
    pub fn is_empty(&self) -> bool {
        self.summary.species.common.is_empty() && self.summary.colors.is_empty()
    }
}

/// Reconcile per-image attributes into one summary.
///
/// Species: most frequent common-name label (case-insensitive), ties broken
/// by first appearance in input order. Colors, meanings and gift occasions:
/// union with case-insensitive dedup, first-seen order. Season: kept only
/// when every image agrees, otherwise "mixed". Care tips: first non-empty.
pub fn aggregate(per_image: &[ImageAttributes]) -> AggregatedAttributes {
    if per_image.is_empty() {
        return AggregatedAttributes::default();
    }

    let species = majority_species(per_image);
    let colors = union_tags(per_image.iter().flat_map(|a| a.colors.iter()));
    let meanings = union_tags(per_image.iter().flat_map(|a| a.meanings.iter()));
    let gift_occasions = union_tags(per_image.iter().flat_map(|a| a.gift_occasions.iter()));

    let seasons: Vec<&str> = per_image
        .iter()
        .map(|a| a.season.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let season = match seasons.first() {
        Some(first) if seasons.iter().all(|s| s.eq_ignore_ascii_case(first)) => {
            first.to_string()
        }
        Some(_) => "mixed".to_string(),
        None => String::new(),
    };

    let care_tips = per_image
        .iter()
        .filter_map(|a| a.care_tips.as_deref())
        .find(|t| !t.trim().is_empty())
        .map(|t| t.to_string());

    AggregatedAttributes {
        species,
        colors,
        meanings,
        season,
        care_tips,
        gift_occasions,
    }
}

fn majority_species(per_image: &[ImageAttributes]) -> Species {
    // Count labels case-insensitively; remember first-seen casing and order.
    let mut order: Vec<(String, &Species, usize)> = Vec::new();

    for attrs in per_image {
        let label = attrs.species.common.trim().to_lowercase();
        if label.is_empty() {
            continue;
        }
        match order.iter_mut().find(|(l, _, _)| *l == label) {
            Some(entry) => entry.2 += 1,
            None => order.push((label, &attrs.species, 1)),
        }
    }

    // max_by_key keeps the later element on ties, so scan manually: first
    // entry with the maximum count wins.
    let best = order.iter().map(|(_, _, n)| *n).max().unwrap_or(0);
    order
        .iter()
        .find(|(_, _, n)| *n == best)
        .map(|(_, s, _)| (*s).clone())
        .unwrap_or_default()
}

fn union_tags<'a>(tags: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed.to_string());
        }
    }
    out
}
