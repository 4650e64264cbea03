//! florapost - flower-shop content automation pipeline
//!
//! Ingests a batch of flower photographs plus minimal metadata and
//! produces, then publishes, platform-specific content: a blog post, a
//! social caption with hashtags, and a short vertical video.
//!
//! # Architecture
//!
//! The pipeline is event-sourced:
//! - Every run records its state changes as immutable events
//! - Run snapshots are derived by replaying events
//! - Re-delivered queue messages re-enter safely (terminal runs are no-ops)
//!
//! # Modules
//!
//! - `analyzer`: vision-service client extracting flower attributes
//! - `generate`: pure analysis → content transform
//! - `media`: short-form video composition (ffmpeg)
//! - `publish` + `adapters`: platform publishers behind one capability trait
//! - `core`: orchestrator, run store, run queue, service boundary
//! - `domain`: data structures (requests, runs, events, outcomes)
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Submit a photo batch to every platform
//! florapost submit roses1.jpg roses2.jpg --title "Morning roses"
//!
//! # Run the worker that executes queued runs
//! florapost worker
//!
//! # Poll a run
//! florapost status <run-id>
//! ```

pub mod adapters;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod generate;
pub mod media;
pub mod publish;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, PipelineService, RetryPolicy, RunQueue, RunStore, Worker};
pub use domain::{
    AnalysisResult, ContentRequest, GeneratedContent, ImageSource, PipelineRun, Platform,
    PublishOutcome, RenderedVideo, RunEvent, RunEventKind, RunState,
};
pub use publish::{PublishBundle, PublishError, Publisher, PublisherRegistry};
