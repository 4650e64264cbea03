//! Command-line interface for florapost.
//!
//! Provides commands for submitting photo batches, checking run status,
//! listing recent runs, cancelling runs, and running the background worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::adapters::{
    BlogCredentials, BlogPublisher, SocialImageCredentials, SocialImagePublisher,
    SocialVideoCredentials, SocialVideoPublisher,
};
use crate::analyzer::VisionClient;
use crate::config;
use crate::core::{Orchestrator, PipelineService, RunQueue, Worker};
use crate::domain::{ContentRequest, ImageSource, PipelineRun, Platform};
use crate::media::VideoComposer;
use crate::publish::PublisherRegistry;

/// florapost - flower-shop content automation pipeline
#[derive(Parser, Debug)]
#[command(name = "florapost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a batch of flower photos for content generation + publishing
    Submit {
        /// Image files, in display order
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Post title (generated from the analysis if omitted)
        #[arg(short, long)]
        title: Option<String>,

        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,

        /// Target platforms (defaults to all)
        #[arg(short, long, value_enum, value_delimiter = ',')]
        platforms: Vec<PlatformArg>,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Cancel a run
    Cancel {
        /// Run ID to cancel
        run_id: String,
    },

    /// Run the background worker (drains the run queue)
    Worker {
        /// Process what is pending, then exit
        #[arg(long)]
        once: bool,

        /// Queue poll interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Platform selector for the CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PlatformArg {
    Blog,
    SocialImage,
    SocialVideo,
}

impl From<PlatformArg> for Platform {
    fn from(p: PlatformArg) -> Self {
        match p {
            PlatformArg::Blog => Platform::Blog,
            PlatformArg::SocialImage => Platform::SocialImage,
            PlatformArg::SocialVideo => Platform::SocialVideo,
        }
    }
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Submit {
                images,
                title,
                description,
                platforms,
            } => submit(images, title, description, platforms).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Cancel { run_id } => cancel(&run_id).await,
            Commands::Worker { once, interval } => worker(once, interval).await,
            Commands::Config => show_config(),
        }
    }
}

/// Acceptance-side service: needs no credentials.
async fn service() -> Result<PipelineService> {
    let cfg = config::config()?;
    let queue = RunQueue::open(&cfg.home).await?;
    Ok(PipelineService::new(cfg.home.join("runs"), queue))
}

/// Full execution stack: analyzer, renderer and every configured publisher.
async fn build_worker() -> Result<Worker> {
    let cfg = config::config()?;

    let api_key = std::env::var("VISION_API_KEY")
        .context("VISION_API_KEY environment variable required")?;
    let analyzer = Arc::new(VisionClient::new(
        cfg.analyzer.endpoint.clone(),
        api_key,
        cfg.analyzer.model.clone(),
        cfg.analyzer_retry.clone(),
    ));

    let renderer = Arc::new(VideoComposer::new(cfg.video.clone()));

    let mut registry = PublisherRegistry::new();
    if let Some(url) = &cfg.publishing.blog_url {
        registry.register(Arc::new(BlogPublisher::new(
            url.clone(),
            BlogCredentials::from_env()?,
        )?));
    }
    if let Some(url) = &cfg.publishing.social_image_url {
        registry.register(Arc::new(SocialImagePublisher::new(
            url.clone(),
            SocialImageCredentials::from_env()?,
        )));
    }
    if let Some(url) = &cfg.publishing.social_video_url {
        registry.register(Arc::new(SocialVideoPublisher::new(
            url.clone(),
            SocialVideoCredentials::from_env()?,
        )));
    }

    let orchestrator = Orchestrator::new(
        analyzer,
        renderer,
        Arc::new(registry),
        cfg.publish_retry.clone(),
    );

    Ok(Worker::new(service().await?, orchestrator))
}

async fn submit(
    images: Vec<PathBuf>,
    title: Option<String>,
    description: Option<String>,
    platforms: Vec<PlatformArg>,
) -> Result<()> {
    for image in &images {
        if !image.is_file() {
            anyhow::bail!("image not found: {}", image.display());
        }
    }

    let platforms: Vec<Platform> = if platforms.is_empty() {
        Platform::ALL.to_vec()
    } else {
        platforms.into_iter().map(Platform::from).collect()
    };

    let mut request = ContentRequest::new(
        images.into_iter().map(ImageSource::new).collect(),
        platforms,
    );
    if let Some(title) = title {
        request = request.with_title(title);
    }
    if let Some(description) = description {
        request = request.with_description(description);
    }

    let run_id = service().await?.submit(request).await?;

    println!("Run accepted: {}", run_id);
    println!("Check progress with: florapost status {}", run_id);
    Ok(())
}

async fn show_status(run_id: &str) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let run = service().await?.status(run_id).await?;
    print_run(&run, true);
    Ok(())
}

async fn list_runs(limit: usize) -> Result<()> {
    let runs = service().await?.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    for run in runs {
        print_run(&run, false);
        println!();
    }
    Ok(())
}

async fn cancel(run_id: &str) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    service().await?.cancel(run_id).await?;
    println!("Cancellation requested for {}", run_id);
    Ok(())
}

async fn worker(once: bool, interval: u64) -> Result<()> {
    let worker = build_worker().await?;

    if once {
        let processed = worker.process_pending().await?;
        println!("Processed {} run(s).", processed);
        return Ok(());
    }

    worker.run_loop(Duration::from_secs(interval)).await
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("home:      {}", cfg.home.display());
    match &cfg.config_file {
        Some(path) => println!("config:    {}", path.display()),
        None => println!("config:    (defaults)"),
    }
    println!("analyzer:  {} ({})", cfg.analyzer.endpoint, cfg.analyzer.model);
    println!(
        "video:     {}x{} @{}fps, {}s target",
        cfg.video.width, cfg.video.height, cfg.video.fps, cfg.video.target_duration_secs
    );
    for (name, url) in [
        ("blog", &cfg.publishing.blog_url),
        ("social_image", &cfg.publishing.social_image_url),
        ("social_video", &cfg.publishing.social_video_url),
    ] {
        match url {
            Some(url) => println!("publisher: {} -> {}", name, url),
            None => println!("publisher: {} (not configured)", name),
        }
    }
    Ok(())
}

fn parse_run_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid run id: {}", raw))
}

fn print_run(run: &PipelineRun, verbose: bool) {
    println!("Run {}", run.id);
    println!("  state:    {}", run.state);
    println!(
        "  created:  {}",
        run.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  images:   {}, platforms: {}",
        run.request.images.len(),
        run.request
            .platforms
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if let Some(analysis) = &run.analysis {
        println!(
            "  analysis: {} ({})",
            analysis.summary.species.common,
            analysis.summary.colors.join(", ")
        );
    }

    for platform in &run.request.platforms {
        match run.outcomes.get(platform) {
            Some(outcome) => println!("  {}", outcome.describe()),
            None => println!("  {}: pending", platform),
        }
    }

    if verbose {
        if let Some(content) = &run.content {
            println!("  caption:  {}", content.caption);
            println!("  hashtags: {}", content.hashtags.len());
        }
        if let Some(video) = &run.video {
            println!(
                "  video:    {} ({:.0}s, {}x{})",
                video.path.display(),
                video.duration_secs,
                video.width,
                video.height
            );
        }
        if let Some(reason) = &run.render_failure {
            println!("  video:    render failed: {}", reason);
        }
    }
}
