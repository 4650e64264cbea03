//! Shared fakes for integration tests: scriptable analyzer, renderer and
//! publishers, plus run-store helpers.

// Each test binary uses a different subset of these.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use florapost::analyzer::{AnalysisError, FlowerAnalyzer};
use florapost::domain::{
    AnalysisResult, ContentRequest, ImageAttributes, ImageSource, Platform, RenderedVideo,
    RunEvent, RunEventKind, Species,
};
use florapost::media::{RenderError, VideoRenderer};
use florapost::publish::{PublishBundle, PublishError, Publisher, PublishReceipt};
use florapost::RunStore;

pub fn rose_analysis() -> AnalysisResult {
    AnalysisResult::from_images(vec![ImageAttributes {
        species: Species {
            common: "Rose".to_string(),
            scientific: "Rosa".to_string(),
        },
        colors: vec!["red".to_string()],
        meanings: vec!["love".to_string()],
        season: "summer".to_string(),
        care_tips: Some("Fresh water daily.".to_string()),
        gift_occasions: vec!["anniversaries".to_string()],
    }])
}

/// Analyzer that always succeeds with a fixed result.
pub struct OkAnalyzer;

#[async_trait]
impl FlowerAnalyzer for OkAnalyzer {
    async fn analyze(&self, _images: &[ImageSource]) -> Result<AnalysisResult, AnalysisError> {
        Ok(rose_analysis())
    }
}

/// Analyzer that always fails fatally.
pub struct FailingAnalyzer;

#[async_trait]
impl FlowerAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _images: &[ImageSource]) -> Result<AnalysisResult, AnalysisError> {
        Err(AnalysisError::Malformed("no flowers here".to_string()))
    }
}

/// Analyzer that files a cancellation into the run's own log while the
/// Analyzing stage is in flight, then succeeds.
pub struct CancellingAnalyzer {
    pub root: std::path::PathBuf,
    pub run_id: Uuid,
}

#[async_trait]
impl FlowerAnalyzer for CancellingAnalyzer {
    async fn analyze(&self, _images: &[ImageSource]) -> Result<AnalysisResult, AnalysisError> {
        let store = RunStore::open(&self.root, self.run_id).await.unwrap();
        store
            .append(&RunEvent::new(self.run_id, RunEventKind::CancelRequested))
            .await
            .unwrap();
        Ok(rose_analysis())
    }
}

/// Renderer that reports success without touching ffmpeg.
pub struct OkRenderer;

#[async_trait]
impl VideoRenderer for OkRenderer {
    async fn compose(
        &self,
        _images: &[ImageSource],
        _caption: Option<&str>,
        output: &Path,
    ) -> Result<RenderedVideo, RenderError> {
        tokio::fs::write(output, b"mp4").await?;
        Ok(RenderedVideo {
            path: output.to_path_buf(),
            duration_secs: 15.0,
            width: 1080,
            height: 1920,
            format: "mp4".to_string(),
        })
    }
}

/// Renderer that always fails.
pub struct FailingRenderer;

#[async_trait]
impl VideoRenderer for FailingRenderer {
    async fn compose(
        &self,
        _images: &[ImageSource],
        _caption: Option<&str>,
        _output: &Path,
    ) -> Result<RenderedVideo, RenderError> {
        Err(RenderError::Encoder("codec exploded".to_string()))
    }
}

/// What a scripted publisher does on every call.
#[derive(Clone, Copy)]
pub enum PublishBehavior {
    Succeed,
    FailTransient,
    FailAuth,
    FailRejected,
}

/// Publisher with a fixed behavior and a call counter.
pub struct ScriptedPublisher {
    platform: Platform,
    behavior: PublishBehavior,
    pub calls: Arc<AtomicU32>,
}

impl ScriptedPublisher {
    pub fn new(platform: Platform, behavior: PublishBehavior) -> Self {
        Self {
            platform,
            behavior,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(&self, _bundle: &PublishBundle) -> Result<PublishReceipt, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            PublishBehavior::Succeed => Ok(PublishReceipt {
                post_id: Some(format!("{}-post", self.platform)),
                url: Some(format!("https://{}.example.com/post", self.platform)),
            }),
            PublishBehavior::FailTransient => {
                Err(PublishError::transient(self.platform, "service unavailable"))
            }
            PublishBehavior::FailAuth => Err(PublishError::auth(self.platform, "bad token")),
            PublishBehavior::FailRejected => {
                Err(PublishError::rejected(self.platform, "caption too racy"))
            }
        }
    }
}

/// Create a store holding only the Accepted event for a fresh run.
pub async fn accepted_run(root: &Path, platforms: Vec<Platform>) -> (RunStore, Uuid) {
    let run_id = Uuid::new_v4();
    let store = RunStore::open(root, run_id).await.unwrap();
    store
        .append(&RunEvent::new(
            run_id,
            RunEventKind::Accepted {
                request: ContentRequest::new(
                    vec![ImageSource::new("rose.jpg"), ImageSource::new("rose2.jpg")],
                    platforms,
                ),
            },
        ))
        .await
        .unwrap();
    (store, run_id)
}
