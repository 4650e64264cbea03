//! Run state and reconstruction from events.
//!
//! A PipelineRun is the full snapshot of one end-to-end execution for a
//! single ContentRequest, derived by replaying the run's event log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::AnalysisResult;
use super::content::{GeneratedContent, RenderedVideo};
use super::events::{RunEvent, RunEventKind};
use super::outcome::PublishOutcome;
use super::request::{ContentRequest, Platform};

/// State of a pipeline run.
///
/// Modeled as a closed enum with an explicit transition path so that
/// "terminal with pending work" is unrepresentable in the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Accepted, waiting for a worker
    Accepted,

    /// Images are being analyzed
    Analyzing,

    /// Text artifacts are being generated
    Generating,

    /// The video is being rendered
    Rendering,

    /// Publishers have been dispatched
    Publishing,

    /// Every requested platform succeeded
    Completed,

    /// A strict subset of platforms succeeded
    PartiallyFailed,

    /// No platform succeeded, or an upstream stage failed fatally
    Failed { reason: String },

    /// Cancelled before any publisher was dispatched
    Cancelled,
}

impl RunState {
    /// Whether no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed
                | RunState::PartiallyFailed
                | RunState::Failed { .. }
                | RunState::Cancelled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Accepted => write!(f, "accepted"),
            RunState::Analyzing => write!(f, "analyzing"),
            RunState::Generating => write!(f, "generating"),
            RunState::Rendering => write!(f, "rendering"),
            RunState::Publishing => write!(f, "publishing"),
            RunState::Completed => write!(f, "completed"),
            RunState::PartiallyFailed => write!(f, "partially_failed"),
            RunState::Failed { reason } => write!(f, "failed: {}", reason),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Snapshot of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique identifier for this run
    pub id: Uuid,

    /// The accepted request (immutable)
    pub request: ContentRequest,

    /// Current state
    pub state: RunState,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Analysis output, once produced
    pub analysis: Option<AnalysisResult>,

    /// Generated text artifacts, once produced
    pub content: Option<GeneratedContent>,

    /// Rendered video, when a video platform was requested and rendering
    /// succeeded
    pub video: Option<RenderedVideo>,

    /// Reason rendering failed, when it did
    pub render_failure: Option<String>,

    /// Terminal outcome per platform
    pub outcomes: HashMap<Platform, PublishOutcome>,

    /// Whether cancellation has been requested
    pub cancel_requested: bool,
}

impl PipelineRun {
    /// Create a fresh run for an accepted request.
    pub fn new(id: Uuid, request: ContentRequest) -> Self {
        Self {
            id,
            request,
            state: RunState::Accepted,
            created_at: Utc::now(),
            completed_at: None,
            analysis: None,
            content: None,
            video: None,
            render_failure: None,
            outcomes: HashMap::new(),
            cancel_requested: false,
        }
    }

    /// Reconstruct a run from its event log.
    ///
    /// Returns None when the log is empty or does not start with Accepted.
    pub fn from_events(events: &[RunEvent]) -> Option<Self> {
        let first = events.first()?;
        let request = match &first.kind {
            RunEventKind::Accepted { request } => request.clone(),
            _ => return None,
        };

        let mut run = Self::new(first.run_id, request);
        run.created_at = first.timestamp;

        for event in &events[1..] {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update the snapshot.
    pub fn apply_event(&mut self, event: &RunEvent) {
        match &event.kind {
            RunEventKind::Accepted { request } => {
                // Only valid as the first event; tolerate replays.
                self.request = request.clone();
                self.created_at = event.timestamp;
            }
            RunEventKind::StateChanged { state } => {
                self.state = state.clone();
                if state.is_terminal() {
                    self.completed_at = Some(event.timestamp);
                }
            }
            RunEventKind::AnalysisCompleted { analysis } => {
                self.analysis = Some(analysis.clone());
            }
            RunEventKind::ContentGenerated { content } => {
                self.content = Some(content.clone());
            }
            RunEventKind::VideoRendered { video } => {
                self.video = Some(video.clone());
            }
            RunEventKind::VideoRenderFailed { reason } => {
                self.render_failure = Some(reason.clone());
            }
            RunEventKind::OutcomeRecorded { outcome } => {
                self.outcomes.insert(outcome.platform, outcome.clone());
            }
            RunEventKind::CancelRequested => {
                self.cancel_requested = true;
            }
        }
    }

    /// Whether this run has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Platforms from the request that have no recorded outcome yet.
    pub fn pending_platforms(&self) -> Vec<Platform> {
        self.request
            .platforms
            .iter()
            .copied()
            .filter(|p| !self.outcomes.contains_key(p))
            .collect()
    }

    /// Count of successful outcomes.
    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }
}
