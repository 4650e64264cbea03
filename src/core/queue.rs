//! JSONL-based run queue for background execution.
//!
//! The queue is the message-passing boundary between request acceptance and
//! pipeline execution: acceptance appends an Enqueued entry and returns;
//! worker tasks drain pending run ids and load run state from the RunStore
//! before acting. Append-only JSONL with state derived from replay, like
//! the run store itself. Delivery is at-least-once; the orchestrator's
//! terminal-snapshot check makes re-delivery a no-op.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

/// Errors from the run queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue item not found: {0}")]
    NotFound(Uuid),

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: ItemStatus, to: ItemStatus },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Status of a queued run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// An event in the queue log (append-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub event_type: QueueEventType,

    /// Error message for Failed entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Types of queue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventType {
    Enqueued,
    Started,
    Finished,
    Failed,
    ResetForRetry,
}

/// A queue item with current state (derived from replaying events).
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub run_id: Uuid,
    pub status: ItemStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub delivery_count: u32,
}

/// Result of enqueueing a run.
#[derive(Debug, Clone)]
pub enum EnqueueResult {
    /// New item queued
    Queued(Uuid),

    /// Already queued and pending/running
    AlreadyQueued(Uuid),

    /// Already executed to completion
    AlreadyProcessed(Uuid),

    /// Previously failed; reset for another delivery
    ResetForRetry(Uuid),
}

impl EnqueueResult {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Queued(id)
            | Self::AlreadyQueued(id)
            | Self::AlreadyProcessed(id)
            | Self::ResetForRetry(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// JSONL-backed run queue.
pub struct RunQueue {
    queue_path: PathBuf,
}

impl RunQueue {
    pub fn new(queue_path: PathBuf) -> Self {
        Self { queue_path }
    }

    /// Open the queue at the standard location under a florapost home.
    pub async fn open(home: &std::path::Path) -> Result<Self, QueueError> {
        fs::create_dir_all(home).await?;
        Ok(Self::new(home.join("run_queue.jsonl")))
    }

    async fn append_event(&self, event: &QueueEvent) -> Result<(), QueueError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay all events to build current state.
    pub async fn replay(&self) -> Result<HashMap<Uuid, QueueItem>, QueueError> {
        let mut items: HashMap<Uuid, QueueItem> = HashMap::new();

        if !self.queue_path.exists() {
            return Ok(items);
        }

        let file = File::open(&self.queue_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: QueueEvent = serde_json::from_str(&line)?;
            Self::apply_event(&mut items, event);
        }

        Ok(items)
    }

    fn apply_event(items: &mut HashMap<Uuid, QueueItem>, event: QueueEvent) {
        match event.event_type {
            QueueEventType::Enqueued => {
                items.entry(event.run_id).or_insert(QueueItem {
                    run_id: event.run_id,
                    status: ItemStatus::Pending,
                    enqueued_at: event.timestamp,
                    started_at: None,
                    finished_at: None,
                    error: None,
                    delivery_count: 0,
                });
            }
            QueueEventType::Started => {
                if let Some(item) = items.get_mut(&event.run_id) {
                    item.status = ItemStatus::Running;
                    item.started_at = Some(event.timestamp);
                    item.delivery_count += 1;
                }
            }
            QueueEventType::Finished => {
                if let Some(item) = items.get_mut(&event.run_id) {
                    item.status = ItemStatus::Done;
                    item.finished_at = Some(event.timestamp);
                }
            }
            QueueEventType::Failed => {
                if let Some(item) = items.get_mut(&event.run_id) {
                    item.status = ItemStatus::Failed;
                    item.finished_at = Some(event.timestamp);
                    item.error = event.error;
                }
            }
            QueueEventType::ResetForRetry => {
                if let Some(item) = items.get_mut(&event.run_id) {
                    item.status = ItemStatus::Pending;
                    item.error = None;
                    item.started_at = None;
                    item.finished_at = None;
                }
            }
        }
    }

    /// Enqueue a run (idempotent per run id).
    pub async fn enqueue(&self, run_id: Uuid) -> Result<EnqueueResult, QueueError> {
        let items = self.replay().await?;

        if let Some(existing) = items.get(&run_id) {
            match existing.status {
                ItemStatus::Done => return Ok(EnqueueResult::AlreadyProcessed(run_id)),
                ItemStatus::Failed => {
                    self.append_event(&QueueEvent {
                        timestamp: Utc::now(),
                        run_id,
                        event_type: QueueEventType::ResetForRetry,
                        error: None,
                    })
                    .await?;
                    return Ok(EnqueueResult::ResetForRetry(run_id));
                }
                _ => return Ok(EnqueueResult::AlreadyQueued(run_id)),
            }
        }

        self.append_event(&QueueEvent {
            timestamp: Utc::now(),
            run_id,
            event_type: QueueEventType::Enqueued,
            error: None,
        })
        .await?;

        Ok(EnqueueResult::Queued(run_id))
    }

    /// All pending items, oldest first.
    pub async fn pending(&self) -> Result<Vec<QueueItem>, QueueError> {
        let items = self.replay().await?;
        let mut pending: Vec<QueueItem> = items
            .into_values()
            .filter(|item| item.status == ItemStatus::Pending)
            .collect();

        pending.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));

        Ok(pending)
    }

    /// Mark a pending item as picked up by a worker.
    pub async fn mark_started(&self, run_id: Uuid) -> Result<(), QueueError> {
        let items = self.replay().await?;
        let item = items.get(&run_id).ok_or(QueueError::NotFound(run_id))?;

        if item.status != ItemStatus::Pending {
            return Err(QueueError::InvalidTransition {
                from: item.status,
                to: ItemStatus::Running,
            });
        }

        self.append_event(&QueueEvent {
            timestamp: Utc::now(),
            run_id,
            event_type: QueueEventType::Started,
            error: None,
        })
        .await
    }

    pub async fn mark_finished(&self, run_id: Uuid) -> Result<(), QueueError> {
        self.append_event(&QueueEvent {
            timestamp: Utc::now(),
            run_id,
            event_type: QueueEventType::Finished,
            error: None,
        })
        .await
    }

    pub async fn mark_failed(&self, run_id: Uuid, error: &str) -> Result<(), QueueError> {
        self.append_event(&QueueEvent {
            timestamp: Utc::now(),
            run_id,
            event_type: QueueEventType::Failed,
            error: Some(error.to_string()),
        })
        .await
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<QueueItem>, QueueError> {
        Ok(self.replay().await?.get(&run_id).cloned())
    }
}
