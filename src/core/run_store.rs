//! Append-only run store with file-based persistence.
//!
//! Each run owns a directory: an events.jsonl log (newline-delimited JSON,
//! easy to inspect) plus an artifacts/ directory holding the generated blog
//! HTML, caption text, and the rendered video.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{PipelineRun, RunEvent};

/// Errors from the run store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("run {0} has a corrupt event log: {1}")]
    CorruptLog(Uuid, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// File-based event store for one run.
pub struct RunStore {
    run_id: Uuid,
    run_dir: PathBuf,
    events_path: PathBuf,
    artifacts_dir: PathBuf,
}

impl RunStore {
    /// Create or open the store for a run under the given runs root.
    pub async fn open(root: &Path, run_id: Uuid) -> Result<Self, StoreError> {
        let run_dir = root.join(run_id.to_string());
        let artifacts_dir = run_dir.join("artifacts");

        fs::create_dir_all(&artifacts_dir).await?;

        Ok(Self {
            run_id,
            events_path: run_dir.join("events.jsonl"),
            run_dir,
            artifacts_dir,
        })
    }

    /// Open the store only if the run already exists.
    pub async fn open_existing(root: &Path, run_id: Uuid) -> Result<Self, StoreError> {
        let run_dir = root.join(run_id.to_string());
        if !run_dir.is_dir() {
            return Err(StoreError::RunNotFound(run_id));
        }
        Self::open(root, run_id).await
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Append an event to the log.
    pub async fn append(&self, event: &RunEvent) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay all events in append order.
    pub async fn replay(&self) -> Result<Vec<RunEvent>, StoreError> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: RunEvent = serde_json::from_str(&line)
                .map_err(|e| StoreError::CorruptLog(self.run_id, e.to_string()))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Reconstruct the run snapshot from the log.
    pub async fn snapshot(&self) -> Result<PipelineRun, StoreError> {
        let events = self.replay().await?;
        PipelineRun::from_events(&events).ok_or(StoreError::RunNotFound(self.run_id))
    }

    /// Write a text artifact (blog HTML, caption) into the run directory.
    pub async fn store_artifact(&self, name: &str, content: &str) -> Result<PathBuf, StoreError> {
        let path = self.artifacts_dir.join(name);
        fs::write(&path, content).await?;
        Ok(path)
    }

    /// Path reserved for the rendered video inside this run.
    pub fn video_path(&self) -> PathBuf {
        self.artifacts_dir.join("short.mp4")
    }

    /// List all run IDs under a runs root, newest directory first not
    /// guaranteed; callers sort by snapshot timestamps.
    pub async fn list_runs(root: &Path) -> Result<Vec<Uuid>, StoreError> {
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}
