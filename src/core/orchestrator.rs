//! Pipeline orchestrator.
//!
//! Drives one run through analyze → generate → render (when a video
//! platform is selected) → publish, recording every transition and outcome
//! in the run's event log before the run is marked terminal. The
//! orchestrator is the only component that decides terminal run state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::analyzer::FlowerAnalyzer;
use crate::domain::{
    AnalysisResult, GeneratedContent, PipelineRun, Platform, PublishOutcome, RunEvent,
    RunEventKind, RunState,
};
use crate::generate;
use crate::media::VideoRenderer;
use crate::publish::{PublishBundle, Publisher, PublisherRegistry};

use super::retry::RetryPolicy;
use super::run_store::RunStore;

/// Hard bound on one platform's publish, retries included. A platform that
/// exceeds it gets a failed outcome instead of stalling the fan-in.
const PLATFORM_PUBLISH_TIMEOUT: Duration = Duration::from_secs(180);

/// The pipeline driver. One instance serves many runs; per-run state lives
/// in the run's own store.
pub struct Orchestrator {
    analyzer: Arc<dyn FlowerAnalyzer>,
    renderer: Arc<dyn VideoRenderer>,
    publishers: Arc<PublisherRegistry>,
    publish_retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        analyzer: Arc<dyn FlowerAnalyzer>,
        renderer: Arc<dyn VideoRenderer>,
        publishers: Arc<PublisherRegistry>,
        publish_retry: RetryPolicy,
    ) -> Self {
        Self {
            analyzer,
            renderer,
            publishers,
            publish_retry,
        }
    }

    /// Execute (or re-enter) the run owned by `store`.
    ///
    /// Idempotent: a terminal run returns its snapshot untouched, so
    /// at-least-once delivery from the queue is safe.
    #[instrument(skip(self, store), fields(run_id = %store.run_id()))]
    pub async fn execute(&self, store: &RunStore) -> Result<PipelineRun> {
        let mut run = store.snapshot().await?;

        if run.is_finished() {
            info!(state = %run.state, "run already terminal, nothing to do");
            return Ok(run);
        }

        if run.cancel_requested {
            return self.finish(store, &mut run, RunState::Cancelled).await;
        }

        // Analyzing. Skipped on crash re-entry when the result is already
        // in the log.
        let analysis = match run.analysis.clone() {
            Some(analysis) => analysis,
            None => match self.run_analysis(store, &mut run).await? {
                Some(analysis) => analysis,
                None => return Ok(run),
            },
        };

        if self.cancel_requested(store).await? {
            return self.finish(store, &mut run, RunState::Cancelled).await;
        }

        // Generating.
        let content = match run.content.clone() {
            Some(content) => Arc::new(content),
            None => match self.run_generation(store, &mut run, &analysis).await? {
                Some(content) => content,
                None => return Ok(run),
            },
        };

        if self.cancel_requested(store).await? {
            return self.finish(store, &mut run, RunState::Cancelled).await;
        }

        // Rendering, only when some selected platform needs it and no
        // earlier entry already rendered or failed.
        if run.request.wants_video() && run.video.is_none() && run.render_failure.is_none() {
            self.run_rendering(store, &mut run, &content).await?;
        }

        // A render failure narrows the publish set instead of failing the
        // run; the dropped platforms get a video-specific outcome.
        let mut publish_set = run.pending_platforms();
        if let Some(reason) = run.render_failure.clone() {
            let dropped: Vec<Platform> = publish_set
                .iter()
                .copied()
                .filter(|p| p.requires_video())
                .collect();
            for platform in dropped {
                let outcome = PublishOutcome::failed(
                    platform,
                    format!("video rendering failed: {}", reason),
                    0,
                );
                self.record_outcome(store, &mut run, outcome).await?;
            }
            publish_set.retain(|p| !p.requires_video());
        }

        if self.cancel_requested(store).await? {
            return self.finish(store, &mut run, RunState::Cancelled).await;
        }

        if !publish_set.is_empty() {
            self.run_publishing(store, &mut run, publish_set, &content)
                .await?;
        }

        self.finish_from_outcomes(store, &mut run).await
    }

    /// Analyzing stage. Returns None when the run went terminal.
    async fn run_analysis(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
    ) -> Result<Option<AnalysisResult>> {
        self.transition(store, run, RunState::Analyzing).await?;

        match self.analyzer.analyze(&run.request.images).await {
            Ok(analysis) => {
                info!(
                    species = %analysis.summary.species.common,
                    images = analysis.per_image.len(),
                    "analysis complete"
                );
                store
                    .append(&RunEvent::new(
                        run.id,
                        RunEventKind::AnalysisCompleted {
                            analysis: analysis.clone(),
                        },
                    ))
                    .await?;
                run.analysis = Some(analysis.clone());
                Ok(Some(analysis))
            }
            Err(e) => {
                error!(error = %e, "analysis failed");
                self.finish(
                    store,
                    run,
                    RunState::Failed {
                        reason: format!("analysis failed: {}", e),
                    },
                )
                .await?;
                Ok(None)
            }
        }
    }

    /// Generating stage. Returns None when the run went terminal.
    async fn run_generation(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
        analysis: &AnalysisResult,
    ) -> Result<Option<Arc<GeneratedContent>>> {
        self.transition(store, run, RunState::Generating).await?;

        match generate::generate(analysis) {
            Ok(content) => {
                store
                    .append(&RunEvent::new(
                        run.id,
                        RunEventKind::ContentGenerated {
                            content: content.clone(),
                        },
                    ))
                    .await?;
                store
                    .store_artifact("blog.html", &content.blog.to_html())
                    .await?;
                store
                    .store_artifact("caption.txt", &content.caption_with_hashtags())
                    .await?;
                run.content = Some(content.clone());
                Ok(Some(Arc::new(content)))
            }
            Err(e) => {
                error!(error = %e, "generation failed");
                self.finish(
                    store,
                    run,
                    RunState::Failed {
                        reason: format!("generation failed: {}", e),
                    },
                )
                .await?;
                Ok(None)
            }
        }
    }

    /// Rendering stage. Failure is recorded, not propagated.
    async fn run_rendering(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
        content: &GeneratedContent,
    ) -> Result<()> {
        self.transition(store, run, RunState::Rendering).await?;

        match self
            .renderer
            .compose(
                &run.request.images,
                Some(&content.caption),
                &store.video_path(),
            )
            .await
        {
            Ok(video) => {
                store
                    .append(&RunEvent::new(
                        run.id,
                        RunEventKind::VideoRendered {
                            video: video.clone(),
                        },
                    ))
                    .await?;
                run.video = Some(video);
            }
            Err(e) => {
                warn!(error = %e, "video rendering failed; narrowing publish set");
                store
                    .append(&RunEvent::new(
                        run.id,
                        RunEventKind::VideoRenderFailed {
                            reason: e.to_string(),
                        },
                    ))
                    .await?;
                run.render_failure = Some(e.to_string());
            }
        }

        Ok(())
    }

    /// Publishing stage: fan out one task per platform, record outcomes as
    /// they land. Total latency is bounded by the slowest platform, not
    /// the sum.
    async fn run_publishing(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
        publish_set: Vec<Platform>,
        content: &Arc<GeneratedContent>,
    ) -> Result<()> {
        self.transition(store, run, RunState::Publishing).await?;

        let bundle = Arc::new(PublishBundle {
            request: run.request.clone(),
            content: content.clone(),
            video: run.video.clone(),
        });

        let mut tasks: JoinSet<PublishOutcome> = JoinSet::new();
        for platform in publish_set {
            match self.publishers.get(platform) {
                Some(publisher) => {
                    let bundle = bundle.clone();
                    let retry = self.publish_retry.clone();
                    tasks.spawn(async move {
                        let dispatch = dispatch_with_retry(publisher, bundle, retry);
                        match tokio::time::timeout(PLATFORM_PUBLISH_TIMEOUT, dispatch).await {
                            Ok(outcome) => outcome,
                            Err(_) => PublishOutcome::failed(
                                platform,
                                format!(
                                    "publish timed out after {}s",
                                    PLATFORM_PUBLISH_TIMEOUT.as_secs()
                                ),
                                0,
                            ),
                        }
                    });
                }
                None => {
                    let outcome =
                        PublishOutcome::failed(platform, "no publisher configured", 0);
                    self.record_outcome(store, run, outcome).await?;
                }
            }
        }

        let mut cancelled = false;
        while let Some(joined) = tasks.join_next().await {
            if let Ok(outcome) = joined {
                self.record_outcome(store, run, outcome).await?;
            }

            // A cancel during publishing stops the wait, not the platforms:
            // already-dispatched submissions cannot be unsent.
            if !cancelled && self.cancel_requested(store).await? {
                warn!("cancel requested mid-publish; abandoning remaining platforms");
                cancelled = true;
                tasks.abort_all();
            }
        }

        // Platforms abandoned without an outcome (cancel or task failure)
        // still get a terminal record before the run does.
        let abandoned_reason = if cancelled {
            "cancelled locally before completion"
        } else {
            "publisher task terminated unexpectedly"
        };
        for platform in run.pending_platforms() {
            let outcome = PublishOutcome::failed(platform, abandoned_reason, 0);
            self.record_outcome(store, run, outcome).await?;
        }

        Ok(())
    }

    /// Compute the terminal state from recorded outcomes.
    async fn finish_from_outcomes(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
    ) -> Result<PipelineRun> {
        let requested = run.request.platforms.len();
        let successes = run.success_count();

        let state = if successes == requested && requested > 0 {
            RunState::Completed
        } else if successes > 0 {
            RunState::PartiallyFailed
        } else if let Some(reason) = run
            .render_failure
            .clone()
            .filter(|_| run.request.platforms.iter().all(|p| p.requires_video()))
        {
            RunState::Failed {
                reason: format!("video rendering failed: {}", reason),
            }
        } else {
            RunState::Failed {
                reason: "no platform publish succeeded".to_string(),
            }
        };

        self.finish(store, run, state).await
    }

    async fn transition(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
        state: RunState,
    ) -> Result<()> {
        info!(from = %run.state, to = %state, "run state transition");
        store
            .append(&RunEvent::new(
                run.id,
                RunEventKind::StateChanged {
                    state: state.clone(),
                },
            ))
            .await?;
        run.state = state;
        Ok(())
    }

    async fn finish(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
        state: RunState,
    ) -> Result<PipelineRun> {
        self.transition(store, run, state).await?;
        run.completed_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn record_outcome(
        &self,
        store: &RunStore,
        run: &mut PipelineRun,
        outcome: PublishOutcome,
    ) -> Result<()> {
        info!(platform = %outcome.platform, success = outcome.is_success(), "outcome recorded");
        store
            .append(&RunEvent::new(
                run.id,
                RunEventKind::OutcomeRecorded {
                    outcome: outcome.clone(),
                },
            ))
            .await?;
        run.outcomes.insert(outcome.platform, outcome);
        Ok(())
    }

    /// Re-read the log for a cancel issued while a stage was running.
    async fn cancel_requested(&self, store: &RunStore) -> Result<bool> {
        let events = store.replay().await?;
        Ok(events
            .iter()
            .any(|e| matches!(e.kind, RunEventKind::CancelRequested)))
    }
}

/// Publisher-boundary retry loop: transient errors back off and retry up to
/// the policy bound; auth and content-rejection fail immediately. Exactly
/// one outcome per call.
async fn dispatch_with_retry(
    publisher: Arc<dyn Publisher>,
    bundle: Arc<PublishBundle>,
    retry: RetryPolicy,
) -> PublishOutcome {
    let platform = publisher.platform();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match publisher.publish(&bundle).await {
            Ok(receipt) => {
                return PublishOutcome::succeeded(platform, receipt.post_id, receipt.url, attempt);
            }
            Err(e) if e.is_retryable() && retry.should_retry(attempt) => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    %platform,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "publish attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(%platform, attempt, error = %e, "publish failed permanently");
                return PublishOutcome::failed(platform, e.to_string(), attempt);
            }
        }
    }
}
