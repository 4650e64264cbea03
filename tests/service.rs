//! End-to-end service tests: submit → queue → worker → status.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{OkAnalyzer, OkRenderer, PublishBehavior, ScriptedPublisher};
use florapost::domain::{ContentRequest, ImageSource, Platform, RunState};
use florapost::publish::PublisherRegistry;
use florapost::{Orchestrator, PipelineService, RetryPolicy, RunQueue, Worker};

fn request(platforms: Vec<Platform>) -> ContentRequest {
    ContentRequest::new(
        vec![ImageSource::new("rose.jpg")],
        platforms,
    )
    .with_title("Morning roses")
}

async fn service(temp: &TempDir) -> PipelineService {
    let queue = RunQueue::open(temp.path()).await.unwrap();
    PipelineService::new(temp.path().join("runs"), queue)
}

fn worker_with(service: PipelineService, blog: Arc<ScriptedPublisher>) -> Worker {
    let registry = PublisherRegistry::new().with(blog);
    let orchestrator = Orchestrator::new(
        Arc::new(OkAnalyzer),
        Arc::new(OkRenderer),
        Arc::new(registry),
        RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            ..Default::default()
        },
    );
    Worker::new(service, orchestrator)
}

#[tokio::test]
async fn submit_returns_immediately_with_a_pollable_run() {
    let temp = TempDir::new().unwrap();
    let service = service(&temp).await;

    let run_id = service.submit(request(vec![Platform::Blog])).await.unwrap();

    // Nothing has executed yet; the snapshot is pollable and non-terminal.
    let run = service.status(run_id).await.unwrap();
    assert_eq!(run.state, RunState::Accepted);
    assert!(run.outcomes.is_empty());
    assert_eq!(run.request.title.as_deref(), Some("Morning roses"));
}

#[tokio::test]
async fn submit_rejects_invalid_requests() {
    let temp = TempDir::new().unwrap();
    let service = service(&temp).await;

    let no_images = ContentRequest::new(vec![], vec![Platform::Blog]);
    assert!(service.submit(no_images).await.is_err());

    let no_platforms = ContentRequest::new(vec![ImageSource::new("a.jpg")], vec![]);
    assert!(service.submit(no_platforms).await.is_err());
}

#[tokio::test]
async fn worker_drains_queue_and_run_reaches_terminal_state() {
    let temp = TempDir::new().unwrap();
    let service_a = service(&temp).await;
    let run_id = service_a.submit(request(vec![Platform::Blog])).await.unwrap();

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let worker = worker_with(service(&temp).await, blog.clone());

    let processed = worker.process_pending().await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(blog.call_count(), 1);

    let run = service_a.status(run_id).await.unwrap();
    assert_eq!(run.state, RunState::Completed);
    assert!(run.outcomes[&Platform::Blog].is_success());

    // Queue is drained.
    assert_eq!(worker.process_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn redelivered_completed_run_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let service_a = service(&temp).await;
    let run_id = service_a.submit(request(vec![Platform::Blog])).await.unwrap();

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let worker = worker_with(service(&temp).await, blog.clone());
    worker.process_pending().await.unwrap();
    assert_eq!(blog.call_count(), 1);

    // Simulate an at-least-once duplicate delivery.
    let duplicate = worker.execute_run(run_id).await.unwrap();

    assert_eq!(duplicate.state, RunState::Completed);
    assert_eq!(duplicate.outcomes.len(), 1);
    assert_eq!(blog.call_count(), 1);
}

#[tokio::test]
async fn cancel_before_worker_pickup_terminates_cleanly() {
    let temp = TempDir::new().unwrap();
    let service_a = service(&temp).await;
    let run_id = service_a.submit(request(vec![Platform::Blog])).await.unwrap();

    service_a.cancel(run_id).await.unwrap();

    let blog = Arc::new(ScriptedPublisher::new(
        Platform::Blog,
        PublishBehavior::Succeed,
    ));
    let worker = worker_with(service(&temp).await, blog.clone());
    worker.process_pending().await.unwrap();

    let run = service_a.status(run_id).await.unwrap();
    assert_eq!(run.state, RunState::Cancelled);
    assert!(run.outcomes.is_empty());
    assert_eq!(blog.call_count(), 0);

    // A second cancel of a terminal run is rejected.
    assert!(service_a.cancel(run_id).await.is_err());
}

#[tokio::test]
async fn list_runs_returns_newest_first() {
    let temp = TempDir::new().unwrap();
    let service = service(&temp).await;

    let first = service.submit(request(vec![Platform::Blog])).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = service.submit(request(vec![Platform::Blog])).await.unwrap();

    let runs = service.list_runs(10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second);
    assert_eq!(runs[1].id, first);

    let limited = service.list_runs(1).await.unwrap();
    assert_eq!(limited.len(), 1);
}
