//! Core pipeline machinery.
//!
//! - `orchestrator`: the analyze → generate → render → publish driver
//! - `run_store`: append-only per-run event log + artifacts
//! - `queue`: JSONL run queue consumed by workers
//! - `retry`: bounded exponential backoff policy
//! - `service`: submit/status/cancel contract and the worker loop

pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod run_store;
pub mod service;

pub use orchestrator::Orchestrator;
pub use queue::{EnqueueResult, ItemStatus, QueueError, QueueItem, RunQueue};
pub use retry::RetryPolicy;
pub use run_store::{RunStore, StoreError};
pub use service::{PipelineService, Worker};
