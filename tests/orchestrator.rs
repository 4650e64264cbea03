//! Orchestrator state-machine integration tests.
//!
//! Runs the full analyze → generate → render → publish flow against
//! scripted collaborators and asserts on the terminal snapshot and the
//! persisted event log.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{
    accepted_run, CancellingAnalyzer, FailingAnalyzer, FailingRenderer, OkAnalyzer, OkRenderer,
    PublishBehavior, ScriptedPublisher,
};
use florapost::domain::{Platform, RunEventKind, RunState};
use florapost::publish::PublisherRegistry;
use florapost::{Orchestrator, RetryPolicy, RunStore};

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
    }
}

fn orchestrator(
    analyzer: impl florapost::analyzer::FlowerAnalyzer + 'static,
    renderer: impl florapost::media::VideoRenderer + 'static,
    registry: PublisherRegistry,
    retry: RetryPolicy,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(analyzer),
        Arc::new(renderer),
        Arc::new(registry),
        retry,
    )
}

#[tokio::test]
async fn all_platforms_succeed_completes_run() {
    let temp = TempDir::new().unwrap();
    let (store, _) = accepted_run(
        temp.path(),
        vec![Platform::Blog, Platform::SocialImage, Platform::SocialVideo],
    )
    .await;

    let registry = PublisherRegistry::new()
        .with(Arc::new(ScriptedPublisher::new(
            Platform::Blog,
            PublishBehavior::Succeed,
        )))
        .with(Arc::new(ScriptedPublisher::new(
            Platform::SocialImage,
            PublishBehavior::Succeed,
        )))
        .with(Arc::new(ScriptedPublisher::new(
            Platform::SocialVideo,
            PublishBehavior::Succeed,
        )));

    let run = orchestrator(OkAnalyzer, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.outcomes.len(), 3);
    assert!(run.outcomes.values().all(|o| o.is_success()));
    assert!(run.video.is_some());
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn mixed_outcomes_terminate_as_partially_failed() {
    // A succeeds, B exhausts its transient retries, C succeeds.
    let temp = TempDir::new().unwrap();
    let (store, _) = accepted_run(
        temp.path(),
        vec![Platform::Blog, Platform::SocialImage, Platform::SocialVideo],
    )
    .await;

    let flaky = Arc::new(ScriptedPublisher::new(
        Platform::SocialImage,
        PublishBehavior::FailTransient,
    ));

    let registry = PublisherRegistry::new()
        .with(Arc::new(ScriptedPublisher::new(
            Platform::Blog,
            PublishBehavior::Succeed,
        )))
        .with(flaky.clone())
        .with(Arc::new(ScriptedPublisher::new(
            Platform::SocialVideo,
            PublishBehavior::Succeed,
        )));

    let run = orchestrator(OkAnalyzer, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::PartiallyFailed);

    // Exactly three outcomes, none pending.
    assert_eq!(run.outcomes.len(), 3);
    assert!(run.pending_platforms().is_empty());

    let failed = &run.outcomes[&Platform::SocialImage];
    assert!(!failed.is_success());
    assert_eq!(failed.attempts, 3);
    assert_eq!(flaky.call_count(), 3);
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let (store, _) = accepted_run(temp.path(), vec![Platform::SocialImage]).await;

    let locked_out = Arc::new(ScriptedPublisher::new(
        Platform::SocialImage,
        PublishBehavior::FailAuth,
    ));
    let registry = PublisherRegistry::new().with(locked_out.clone());

    let run = orchestrator(OkAnalyzer, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    assert!(matches!(run.state, RunState::Failed { .. }));
    assert_eq!(locked_out.call_count(), 1);
    assert_eq!(run.outcomes[&Platform::SocialImage].attempts, 1);
}

#[tokio::test]
async fn render_failure_narrows_publish_set() {
    // Text-only platform still publishes; the video platform's outcome
    // carries a video-specific reason.
    let temp = TempDir::new().unwrap();
    let (store, _) =
        accepted_run(temp.path(), vec![Platform::Blog, Platform::SocialVideo]).await;

    let video_pub = Arc::new(ScriptedPublisher::new(
        Platform::SocialVideo,
        PublishBehavior::Succeed,
    ));
    let registry = PublisherRegistry::new()
        .with(Arc::new(ScriptedPublisher::new(
            Platform::Blog,
            PublishBehavior::Succeed,
        )))
        .with(video_pub.clone());

    let run = orchestrator(OkAnalyzer, FailingRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::PartiallyFailed);
    assert!(run.outcomes[&Platform::Blog].is_success());

    let video_outcome = &run.outcomes[&Platform::SocialVideo];
    assert!(!video_outcome.is_success());
    assert!(video_outcome.describe().contains("video rendering failed"));

    // The video publisher itself was never invoked.
    assert_eq!(video_pub.call_count(), 0);
}

#[tokio::test]
async fn render_failure_with_only_video_platforms_fails_run() {
    let temp = TempDir::new().unwrap();
    let (store, _) = accepted_run(temp.path(), vec![Platform::SocialVideo]).await;

    let registry = PublisherRegistry::new().with(Arc::new(ScriptedPublisher::new(
        Platform::SocialVideo,
        PublishBehavior::Succeed,
    )));

    let run = orchestrator(OkAnalyzer, FailingRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    match &run.state {
        RunState::Failed { reason } => assert!(reason.contains("video rendering failed")),
        other => panic!("expected Failed, got {:?}", other),
    }
    // The dropped platform still has a terminal outcome.
    assert_eq!(run.outcomes.len(), 1);
}

#[tokio::test]
async fn analysis_failure_fails_run_without_outcomes() {
    let temp = TempDir::new().unwrap();
    let (store, _) =
        accepted_run(temp.path(), vec![Platform::Blog, Platform::SocialImage]).await;

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let registry = PublisherRegistry::new().with(blog.clone());

    let run = orchestrator(FailingAnalyzer, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    match &run.state {
        RunState::Failed { reason } => assert!(reason.contains("analysis failed")),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert!(run.outcomes.is_empty());
    assert_eq!(blog.call_count(), 0);
}

#[tokio::test]
async fn terminal_run_reentry_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let (store, run_id) = accepted_run(temp.path(), vec![Platform::Blog]).await;

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let registry = PublisherRegistry::new().with(blog.clone());
    let orchestrator = orchestrator(OkAnalyzer, OkRenderer, registry, fast_retry(3));

    let first = orchestrator.execute(&store).await.unwrap();
    assert_eq!(first.state, RunState::Completed);
    assert_eq!(blog.call_count(), 1);

    let events_after_first = store.replay().await.unwrap().len();

    // At-least-once queue delivery: the same run id arrives again.
    let reopened = RunStore::open(temp.path(), run_id).await.unwrap();
    let second = orchestrator.execute(&reopened).await.unwrap();

    assert_eq!(second.state, RunState::Completed);
    assert_eq!(second.outcomes.len(), 1);
    // No new publish calls, no new events.
    assert_eq!(blog.call_count(), 1);
    assert_eq!(store.replay().await.unwrap().len(), events_after_first);
}

#[tokio::test]
async fn crash_reentry_skips_platforms_with_outcomes() {
    // A worker died mid-publishing: the log holds the analysis, the
    // content, and one recorded outcome, but no terminal state.
    let temp = TempDir::new().unwrap();
    let (store, run_id) =
        accepted_run(temp.path(), vec![Platform::Blog, Platform::SocialImage]).await;

    let analysis = common::rose_analysis();
    let content = florapost::generate::generate(&analysis).unwrap();
    store
        .append(&florapost::RunEvent::new(
            run_id,
            RunEventKind::AnalysisCompleted { analysis },
        ))
        .await
        .unwrap();
    store
        .append(&florapost::RunEvent::new(
            run_id,
            RunEventKind::ContentGenerated { content },
        ))
        .await
        .unwrap();
    store
        .append(&florapost::RunEvent::new(
            run_id,
            RunEventKind::OutcomeRecorded {
                outcome: florapost::PublishOutcome::succeeded(
                    Platform::Blog,
                    Some("b1".to_string()),
                    None,
                    1,
                ),
            },
        ))
        .await
        .unwrap();

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let image = Arc::new(ScriptedPublisher::new(
        Platform::SocialImage,
        PublishBehavior::Succeed,
    ));
    let registry = PublisherRegistry::new().with(blog.clone()).with(image.clone());

    let run = orchestrator(OkAnalyzer, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.outcomes.len(), 2);
    // Only the platform without an outcome was dispatched.
    assert_eq!(blog.call_count(), 0);
    assert_eq!(image.call_count(), 1);
}

#[tokio::test]
async fn cancel_during_analysis_terminates_with_zero_outcomes() {
    let temp = TempDir::new().unwrap();
    let (store, run_id) =
        accepted_run(temp.path(), vec![Platform::Blog, Platform::SocialImage]).await;

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let registry = PublisherRegistry::new().with(blog.clone());

    let cancelling = CancellingAnalyzer {
        root: temp.path().to_path_buf(),
        run_id,
    };

    let run = orchestrator(cancelling, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Cancelled);
    assert!(run.outcomes.is_empty());
    assert_eq!(blog.call_count(), 0);
}

#[tokio::test]
async fn cancel_before_execution_never_touches_publishers() {
    let temp = TempDir::new().unwrap();
    let (store, run_id) = accepted_run(temp.path(), vec![Platform::Blog]).await;
    store
        .append(&florapost::RunEvent::new(
            run_id,
            RunEventKind::CancelRequested,
        ))
        .await
        .unwrap();

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let registry = PublisherRegistry::new().with(blog.clone());

    let run = orchestrator(OkAnalyzer, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Cancelled);
    assert!(run.outcomes.is_empty());
    assert_eq!(blog.call_count(), 0);
}

#[tokio::test]
async fn every_outcome_is_written_before_the_terminal_state() {
    let temp = TempDir::new().unwrap();
    let (store, _) =
        accepted_run(temp.path(), vec![Platform::Blog, Platform::SocialImage]).await;

    let registry = PublisherRegistry::new()
        .with(Arc::new(ScriptedPublisher::new(
            Platform::Blog,
            PublishBehavior::Succeed,
        )))
        .with(Arc::new(ScriptedPublisher::new(
            Platform::SocialImage,
            PublishBehavior::FailRejected,
        )));

    orchestrator(OkAnalyzer, OkRenderer, registry, fast_retry(3))
        .execute(&store)
        .await
        .unwrap();

    let events = store.replay().await.unwrap();
    let terminal_index = events
        .iter()
        .position(|e| {
            matches!(&e.kind, RunEventKind::StateChanged { state } if state.is_terminal())
        })
        .expect("terminal state recorded");

    let outcome_indices: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e.kind, RunEventKind::OutcomeRecorded { .. }))
        .map(|(i, _)| i)
        .collect();

    assert_eq!(outcome_indices.len(), 2);
    assert!(outcome_indices.iter().all(|i| *i < terminal_index));
}
