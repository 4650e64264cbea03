//! Per-platform publish outcomes.
//!
//! One terminal outcome per (run, platform). Publisher-boundary retries
//! happen before the outcome is recorded, so recorded outcomes are final;
//! the attempt count is carried on the outcome instead of rewriting history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::Platform;

/// Terminal status of one publish attempt chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OutcomeStatus {
    /// The platform accepted the content
    Succeeded {
        /// Platform-assigned post identifier, when returned
        post_id: Option<String>,
        /// Public URL of the post, when returned
        url: Option<String>,
    },

    /// The platform rejected the content, or retries were exhausted
    Failed { reason: String },
}

/// Record of publishing one run to one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub platform: Platform,
    pub status: OutcomeStatus,

    /// Attempts spent (1 for a first-try success)
    pub attempts: u32,

    pub recorded_at: DateTime<Utc>,
}

impl PublishOutcome {
    pub fn succeeded(
        platform: Platform,
        post_id: Option<String>,
        url: Option<String>,
        attempts: u32,
    ) -> Self {
        Self {
            platform,
            status: OutcomeStatus::Succeeded { post_id, url },
            attempts,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(platform: Platform, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            platform,
            status: OutcomeStatus::Failed {
                reason: reason.into(),
            },
            attempts,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded { .. })
    }

    /// Human-readable result line for status output.
    pub fn describe(&self) -> String {
        match &self.status {
            OutcomeStatus::Succeeded { url, post_id } => {
                let reference = url
                    .as_deref()
                    .or(post_id.as_deref())
                    .unwrap_or("accepted");
                format!("{}: published ({})", self.platform, reference)
            }
            OutcomeStatus::Failed { reason } => {
                format!("{}: failed after {} attempt(s): {}", self.platform, self.attempts, reason)
            }
        }
    }
}
