//! Inbound service contract and the background worker.
//!
//! `PipelineService` is the acceptance boundary: submit persists the run,
//! enqueues its id and returns immediately; status and cancel read/append
//! the run's own log. Execution lives in `Worker`, which drains the queue
//! out-of-band, matching the deployment split between the request layer
//! and worker processes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::{ContentRequest, PipelineRun, RunEvent, RunEventKind};

use super::orchestrator::Orchestrator;
use super::queue::RunQueue;
use super::run_store::RunStore;

/// Front door of the pipeline: accept, poll, cancel.
pub struct PipelineService {
    runs_root: PathBuf,
    queue: RunQueue,
}

impl PipelineService {
    pub fn new(runs_root: PathBuf, queue: RunQueue) -> Self {
        Self { runs_root, queue }
    }

    pub fn runs_root(&self) -> &PathBuf {
        &self.runs_root
    }

    /// Accept a request: persist the run, enqueue it, return the run id.
    #[instrument(skip(self, request))]
    pub async fn submit(&self, request: ContentRequest) -> Result<Uuid> {
        request
            .validate()
            .map_err(|reason| anyhow::anyhow!(reason))
            .context("invalid content request")?;

        let run_id = Uuid::new_v4();
        let store = RunStore::open(&self.runs_root, run_id).await?;
        store
            .append(&RunEvent::new(run_id, RunEventKind::Accepted { request }))
            .await?;

        self.queue.enqueue(run_id).await?;
        info!(%run_id, "run accepted and queued");

        Ok(run_id)
    }

    /// Current snapshot of a run, for polling.
    pub async fn status(&self, run_id: Uuid) -> Result<PipelineRun> {
        let store = RunStore::open_existing(&self.runs_root, run_id).await?;
        Ok(store.snapshot().await?)
    }

    /// Request cancellation. Before publishing starts this terminates the
    /// run cleanly; after dispatch it only stops the wait for outcomes.
    pub async fn cancel(&self, run_id: Uuid) -> Result<()> {
        let store = RunStore::open_existing(&self.runs_root, run_id).await?;
        let run = store.snapshot().await?;
        if run.is_finished() {
            anyhow::bail!("run {} is already terminal ({})", run_id, run.state);
        }

        store
            .append(&RunEvent::new(run_id, RunEventKind::CancelRequested))
            .await?;
        info!(%run_id, "cancellation requested");
        Ok(())
    }

    /// Recent runs, newest first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        let run_ids = RunStore::list_runs(&self.runs_root).await?;
        let mut runs = Vec::new();

        for run_id in run_ids {
            if let Ok(store) = RunStore::open_existing(&self.runs_root, run_id).await {
                if let Ok(run) = store.snapshot().await {
                    runs.push(run);
                }
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);

        Ok(runs)
    }

    pub(crate) fn queue(&self) -> &RunQueue {
        &self.queue
    }
}

/// Background executor: drains the queue and drives the orchestrator.
pub struct Worker {
    service: PipelineService,
    orchestrator: Orchestrator,
}

impl Worker {
    pub fn new(service: PipelineService, orchestrator: Orchestrator) -> Self {
        Self {
            service,
            orchestrator,
        }
    }

    /// Execute one run now.
    pub async fn execute_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let store = RunStore::open_existing(self.service.runs_root(), run_id).await?;
        self.orchestrator.execute(&store).await
    }

    /// Drain everything currently pending. Returns the number of runs
    /// picked up.
    pub async fn process_pending(&self) -> Result<usize> {
        let pending = self.service.queue().pending().await?;
        let count = pending.len();

        for item in pending {
            self.service.queue().mark_started(item.run_id).await?;

            match self.execute_run(item.run_id).await {
                Ok(run) => {
                    info!(run_id = %item.run_id, state = %run.state, "run finished");
                    self.service.queue().mark_finished(item.run_id).await?;
                }
                Err(e) => {
                    // Infrastructure failure (store unreadable, etc.); the
                    // item stays replayable.
                    error!(run_id = %item.run_id, error = %e, "run execution errored");
                    self.service
                        .queue()
                        .mark_failed(item.run_id, &e.to_string())
                        .await?;
                }
            }
        }

        Ok(count)
    }

    /// Poll the queue forever.
    pub async fn run_loop(&self, poll_interval: Duration) -> Result<()> {
        info!(interval_secs = poll_interval.as_secs(), "worker started");
        loop {
            let processed = self.process_pending().await?;
            if processed == 0 {
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
