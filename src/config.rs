//! Configuration for florapost.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (FLORAPOST_HOME)
//! 2. Config file (.florapost/config.yaml)
//! 3. Defaults (~/.florapost)
//!
//! Config file discovery searches the current directory and its parents
//! for .florapost/config.yaml. Credentials are never stored here; they are
//! read from the environment in the composition root and injected into the
//! adapters.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::retry::RetryPolicy;
use crate::media::VideoSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub analyzer: Option<AnalyzerConfig>,
    #[serde(default)]
    pub video: Option<VideoSettings>,
    #[serde(default)]
    pub publishing: Option<PublishingConfig>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to the config file's parent project)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishingConfig {
    pub blog_url: Option<String>,
    pub social_image_url: Option<String>,
    pub social_video_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
    pub analyzer: Option<RetryPolicy>,
    pub publish: Option<RetryPolicy>,
}

/// Vision service settings with defaults applied.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub endpoint: String,
    pub model: String,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-3-opus-20240229".to_string(),
        }
    }
}

/// Publisher base URLs. Left unset until the deployment configures them.
#[derive(Debug, Clone, Default)]
pub struct PublishingSettings {
    pub blog_url: Option<String>,
    pub social_image_url: Option<String>,
    pub social_video_url: Option<String>,
}

/// Resolved configuration with absolute paths and defaults applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to florapost home (run state, queue)
    pub home: PathBuf,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,

    pub analyzer: AnalyzerSettings,
    pub video: VideoSettings,
    pub publishing: PublishingSettings,
    pub analyzer_retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
}

/// Find config file by searching current directory and parents.
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".florapost").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file.
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory.
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources.
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".florapost");

    let config_file = find_config_file();
    let parsed = match &config_file {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    // Home: env var beats config file beats default.
    let home = if let Ok(env_home) = std::env::var("FLORAPOST_HOME") {
        PathBuf::from(env_home)
    } else if let Some((path, home_str)) = config_file.as_ref().zip(
        parsed
            .as_ref()
            .and_then(|c| c.paths.home.as_deref()),
    ) {
        let base = path.parent().unwrap_or(Path::new("."));
        resolve_path(base, home_str)
    } else {
        default_home
    };

    let analyzer = {
        let defaults = AnalyzerSettings::default();
        let file = parsed.as_ref().and_then(|c| c.analyzer.clone());
        AnalyzerSettings {
            endpoint: file
                .as_ref()
                .and_then(|a| a.endpoint.clone())
                .unwrap_or(defaults.endpoint),
            model: file
                .as_ref()
                .and_then(|a| a.model.clone())
                .unwrap_or(defaults.model),
        }
    };

    let video = parsed
        .as_ref()
        .and_then(|c| c.video.clone())
        .unwrap_or_default();

    let publishing = parsed
        .as_ref()
        .and_then(|c| c.publishing.clone())
        .map(|p| PublishingSettings {
            blog_url: p.blog_url,
            social_image_url: p.social_image_url,
            social_video_url: p.social_video_url,
        })
        .unwrap_or_default();

    let retry = parsed.as_ref().and_then(|c| c.retry.clone());
    let analyzer_retry = retry
        .as_ref()
        .and_then(|r| r.analyzer.clone())
        .unwrap_or_else(RetryPolicy::analyzer_default);
    let publish_retry = retry
        .as_ref()
        .and_then(|r| r.publish.clone())
        .unwrap_or_default();

    Ok(ResolvedConfig {
        home,
        config_file,
        analyzer,
        video,
        publishing,
        analyzer_retry,
        publish_retry,
    })
}

/// Get the global configuration (loads once, then cached).
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing).
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the florapost home directory (run state, queue).
pub fn florapost_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the runs directory ($FLORAPOST_HOME/runs).
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("runs"))
}
