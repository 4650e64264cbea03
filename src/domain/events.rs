//! Event types for the event-sourced run log.
//!
//! Every state change of a pipeline run is recorded as an immutable event
//! in an append-only log. The current state of any run is reconstructed by
//! replaying its events in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::AnalysisResult;
use super::content::{GeneratedContent, RenderedVideo};
use super::outcome::PublishOutcome;
use super::request::ContentRequest;
use super::run::RunState;

/// A single entry in a run's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    #[serde(flatten)]
    pub kind: RunEventKind,
}

impl RunEvent {
    pub fn new(run_id: Uuid, kind: RunEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            kind,
        }
    }
}

/// What happened. Payload-carrying variants hold the produced artifact so
/// that replay alone fully reconstructs a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum RunEventKind {
    /// The request was accepted and the run created
    Accepted { request: ContentRequest },

    /// The run moved to a new state
    StateChanged { state: RunState },

    /// Image analysis finished
    AnalysisCompleted { analysis: AnalysisResult },

    /// Text artifacts were generated
    ContentGenerated { content: GeneratedContent },

    /// The video was rendered
    VideoRendered { video: RenderedVideo },

    /// Rendering failed; video platforms are dropped from the publish set
    VideoRenderFailed { reason: String },

    /// A publisher finished (successfully or not) for one platform
    OutcomeRecorded { outcome: PublishOutcome },

    /// Cancellation was requested for this run
    CancelRequested,
}

impl RunEventKind {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            RunEventKind::Accepted { .. } => "accepted",
            RunEventKind::StateChanged { .. } => "state_changed",
            RunEventKind::AnalysisCompleted { .. } => "analysis_completed",
            RunEventKind::ContentGenerated { .. } => "content_generated",
            RunEventKind::VideoRendered { .. } => "video_rendered",
            RunEventKind::VideoRenderFailed { .. } => "video_render_failed",
            RunEventKind::OutcomeRecorded { .. } => "outcome_recorded",
            RunEventKind::CancelRequested => "cancel_requested",
        }
    }
}
