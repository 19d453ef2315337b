//! yt-dlp backed [`VideoSource`]

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::process_runner::{run_tool, run_tool_streaming};
use super::url_resolver::watch_url;
use crate::models::VideoMetadata;
use crate::types::{CapabilityError, ProgressCallback, VideoSource};

const TOOL: &str = "yt-dlp";

/// Base name of the downloaded file inside the job directory
const VIDEO_STEM: &str = "video";

static PROGRESS_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\[download\]\s+(\d{1,3}(?:\.\d+)?)%").ok());

/// Subset of `yt-dlp --dump-json` output
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    channel: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
}

pub struct YtDlpSource {
    binary: String,
    max_height: u32,
}

impl YtDlpSource {
    pub fn new(binary: impl Into<String>, max_height: u32) -> Self {
        Self {
            binary: binary.into(),
            max_height,
        }
    }

    /// Format selector with fallbacks; all respect the height ceiling except the last
    fn format_selector(&self) -> String {
        let h = self.max_height;
        format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}]/best"
        )
    }
}

#[async_trait::async_trait]
impl VideoSource for YtDlpSource {
    async fn fetch_metadata(&self, video_id: &str) -> Result<VideoMetadata, CapabilityError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--dump-json")
            .arg("--no-download")
            .arg("--no-playlist")
            .arg(watch_url(video_id));

        let stdout = run_tool(TOOL, command).await?;
        parse_metadata(&stdout)
    }

    async fn download(
        &self,
        video_id: &str,
        output_dir: &Path,
        on_progress: ProgressCallback,
    ) -> Result<PathBuf, CapabilityError> {
        let template = output_dir.join(format!("{}.%(ext)s", VIDEO_STEM));

        let mut command = Command::new(&self.binary);
        command
            .arg("-f")
            .arg(self.format_selector())
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--no-playlist")
            .arg("--newline")
            .arg("-o")
            .arg(&template)
            .arg(watch_url(video_id));

        tracing::debug!(video_id, max_height = self.max_height, "Starting yt-dlp download");

        run_tool_streaming(TOOL, command, |line| {
            if let Some(percent) = parse_progress_line(line) {
                on_progress(percent);
            }
        })
        .await?;

        find_downloaded_file(output_dir).await
    }
}

/// Parse `--dump-json` output, filling defaults for missing fields
pub fn parse_metadata(raw: &str) -> Result<VideoMetadata, CapabilityError> {
    let info: YtDlpInfo = serde_json::from_str(raw.trim())
        .map_err(|e| CapabilityError::Parse(format!("yt-dlp metadata: {}", e)))?;

    Ok(VideoMetadata {
        title: non_blank(info.title).unwrap_or_else(|| "Unknown Title".to_string()),
        duration_seconds: info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u64)
            .unwrap_or(0),
        channel: non_blank(info.channel)
            .or_else(|| non_blank(info.uploader))
            .unwrap_or_else(|| "Unknown Channel".to_string()),
        thumbnail_url: info.thumbnail.unwrap_or_default(),
        description: non_blank(info.description),
    })
}

/// Percentage from a `[download]  42.3% of ...` line, if present
pub fn parse_progress_line(line: &str) -> Option<f32> {
    let re = PROGRESS_RE.as_ref()?;
    let percent: f32 = re.captures(line)?.get(1)?.as_str().parse().ok()?;
    Some(percent.clamp(0.0, 100.0))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// The merged output file; partial and fragment files are ignored
async fn find_downloaded_file(output_dir: &Path) -> Result<PathBuf, CapabilityError> {
    let preferred = output_dir.join(format!("{}.mp4", VIDEO_STEM));
    if tokio::fs::try_exists(&preferred).await.unwrap_or(false) {
        return Ok(preferred);
    }

    let mut entries = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_video = path.file_stem().and_then(|s| s.to_str()) == Some(VIDEO_STEM);
        let is_partial = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "part" || e == "ytdl")
            .unwrap_or(false);
        if is_video && !is_partial {
            return Ok(path);
        }
    }

    Err(CapabilityError::ToolFailed {
        tool: TOOL.to_string(),
        stderr: "download finished but no video file was produced".to_string(),
    })
}
