//! Short-form video composition from still images.
//!
//! Builds a 9:16 slideshow: every image gets an equal time slice, slices
//! are joined with crossfades, and an optional caption is drawn over the
//! opening slice. The encode itself runs in an external `ffmpeg` process
//! with a deterministically constructed argument list.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::domain::{ImageSource, RenderedVideo};

/// Rendering errors. Non-fatal to the run: the orchestrator narrows the
/// publish set instead of aborting.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no images to render")]
    NoImages,

    #[error("unsupported image format: {0}")]
    UnsupportedImage(String),

    #[error("ffmpeg timed out after {0}s")]
    Timeout(u64),

    #[error("ffmpeg failed: {0}")]
    Encoder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output geometry and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Target duration; clamped to the short-form band before use
    #[serde(default = "default_duration")]
    pub target_duration_secs: f64,

    #[serde(default = "default_crossfade")]
    pub crossfade_secs: f64,

    /// Hard cap on the encode subprocess
    #[serde(default = "default_encode_timeout")]
    pub encode_timeout_secs: u64,
}

fn default_width() -> u32 {
    1080
}
fn default_height() -> u32 {
    1920
}
fn default_fps() -> u32 {
    30
}
fn default_duration() -> f64 {
    15.0
}
fn default_crossfade() -> f64 {
    0.5
}
fn default_encode_timeout() -> u64 {
    300
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            target_duration_secs: default_duration(),
            crossfade_secs: default_crossfade(),
            encode_timeout_secs: default_encode_timeout(),
        }
    }
}

/// Short-form duration band in seconds.
const MIN_DURATION_SECS: f64 = 6.0;
const MAX_DURATION_SECS: f64 = 60.0;

impl VideoSettings {
    /// Target duration clamped to the short-form band.
    pub fn clamped_duration(&self) -> f64 {
        self.target_duration_secs
            .clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
    }
}

/// Capability interface for the rendering stage.
#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn compose(
        &self,
        images: &[ImageSource],
        caption: Option<&str>,
        output: &Path,
    ) -> Result<RenderedVideo, RenderError>;
}

/// ffmpeg-backed renderer.
pub struct VideoComposer {
    ffmpeg_path: String,
    settings: VideoSettings,
}

impl VideoComposer {
    pub fn new(settings: VideoSettings) -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            settings,
        }
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Full argument list for one composition. Public within the crate so
    /// tests can assert on it without spawning ffmpeg.
    pub(crate) fn build_args(
        &self,
        images: &[ImageSource],
        caption: Option<&str>,
        output: &Path,
    ) -> Vec<String> {
        let plan = SlicePlan::new(images.len(), &self.settings);
        let mut args: Vec<String> = vec!["-y".to_string(), "-hide_banner".to_string()];

        for image in images {
            args.push("-loop".to_string());
            args.push("1".to_string());
            args.push("-t".to_string());
            args.push(format!("{:.3}", plan.slice_secs));
            args.push("-i".to_string());
            args.push(image.path.display().to_string());
        }

        args.push("-filter_complex".to_string());
        args.push(build_filter_graph(images.len(), caption, &self.settings, &plan));

        args.extend(
            [
                "-map",
                "[vout]",
                "-r",
                &self.settings.fps.to_string(),
                "-pix_fmt",
                "yuv420p",
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-movflags",
                "+faststart",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        args.push(output.display().to_string());
        args
    }
}

#[async_trait]
impl VideoRenderer for VideoComposer {
    async fn compose(
        &self,
        images: &[ImageSource],
        caption: Option<&str>,
        output: &Path,
    ) -> Result<RenderedVideo, RenderError> {
        if images.is_empty() {
            return Err(RenderError::NoImages);
        }
        for image in images {
            if image.mime_type().is_none() {
                return Err(RenderError::UnsupportedImage(image.file_name()));
            }
        }

        let args = self.build_args(images, caption, output);
        debug!(?args, "spawning ffmpeg");

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let encode_timeout = Duration::from_secs(self.settings.encode_timeout_secs);
        let result = timeout(encode_timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.settings.encode_timeout_secs))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            // ffmpeg's stderr is long; the failure is at the tail.
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(RenderError::Encoder(tail));
        }

        let duration = self.settings.clamped_duration();
        info!(output = %output.display(), duration_secs = duration, "video rendered");

        Ok(RenderedVideo {
            path: output.to_path_buf(),
            duration_secs: duration,
            width: self.settings.width,
            height: self.settings.height,
            format: "mp4".to_string(),
        })
    }
}

/// Per-image timing: equal slices whose crossfaded chain sums to the
/// clamped target duration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlicePlan {
    pub slice_secs: f64,
    /// xfade offsets, one per transition
    pub offsets: Vec<f64>,
}

impl SlicePlan {
    pub(crate) fn new(image_count: usize, settings: &VideoSettings) -> Self {
        let target = settings.clamped_duration();
        let n = image_count.max(1) as f64;
        let fade = if image_count > 1 {
            settings.crossfade_secs
        } else {
            0.0
        };

        // n slices overlapped by (n-1) fades must sum to the target:
        // n*slice - (n-1)*fade = target
        let slice = (target + (n - 1.0) * fade) / n;

        let offsets = (1..image_count)
            .map(|k| k as f64 * (slice - fade))
            .collect();

        Self {
            slice_secs: slice,
            offsets,
        }
    }
}

/// Deterministic filter graph: normalize every input to the portrait frame,
/// chain crossfades, then draw the caption over the opening slice.
fn build_filter_graph(
    image_count: usize,
    caption: Option<&str>,
    settings: &VideoSettings,
    plan: &SlicePlan,
) -> String {
    let mut graph = String::new();

    for i in 0..image_count {
        graph.push_str(&format!(
            "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps}[v{i}];",
            i = i,
            w = settings.width,
            h = settings.height,
            fps = settings.fps,
        ));
    }

    let mut current = "v0".to_string();
    for (k, offset) in plan.offsets.iter().enumerate() {
        let next_label = format!("x{}", k + 1);
        graph.push_str(&format!(
            "[{cur}][v{next}]xfade=transition=fade:duration={fade:.3}:offset={offset:.3}[{label}];",
            cur = current,
            next = k + 1,
            fade = settings.crossfade_secs,
            offset = offset,
            label = next_label,
        ));
        current = next_label;
    }

    match caption {
        Some(text) if !text.trim().is_empty() => {
            graph.push_str(&format!(
                "[{cur}]drawtext=text='{text}':fontcolor=white:fontsize=64:borderw=2:\
x=(w-text_w)/2:y=h-240:enable='between(t,0,{until:.3})'[vout]",
                cur = current,
                text = escape_drawtext(text),
                until = plan.slice_secs,
            ));
        }
        _ => {
            graph.push_str(&format!("[{cur}]null[vout]", cur = current));
        }
    }

    graph
}

/// Escape characters that break ffmpeg's drawtext option parsing.
fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            ':' => escaped.push_str("\\:"),
            '%' => escaped.push_str("\\%"),
            _ => escaped.push(c),
        }
    }
    escaped
}
