//! Capability traits for the external collaborators of the pipeline
//!
//! The pipeline depends only on these contracts:
//! - [`VideoSource`]: metadata dump and download (yt-dlp)
//! - [`MediaTranscoder`]: audio track and scene-change frames (ffmpeg)
//! - [`OcrEngine`]: text recognition for one image (tesseract)
//! - [`SpeechToText`]: transcription of an audio file
//! - [`ChatModel`]: chat-style completion, optionally with one image
//!
//! Production implementations live in `services`; tests substitute fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::models::VideoMetadata;

/// Download progress callback (percentage 0.0-100.0)
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// External capability failure
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// External tool could not be started
    #[error("Failed to start {tool}: {message}")]
    Spawn { tool: String, message: String },

    /// External tool exited unsuccessfully
    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },

    /// Connection-level failure (refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// API returned a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Output could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Capability is not configured (e.g. missing API key)
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    /// Transient failures are worth retrying; everything else is final
    pub fn is_transient(&self) -> bool {
        matches!(self, CapabilityError::Network(_) | CapabilityError::Timeout(_))
    }
}

/// Video metadata and download tool
#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    /// Fetch metadata without downloading the video
    async fn fetch_metadata(&self, video_id: &str) -> Result<VideoMetadata, CapabilityError>;

    /// Download the video into `output_dir`, returning the merged file path
    async fn download(
        &self,
        video_id: &str,
        output_dir: &Path,
        on_progress: ProgressCallback,
    ) -> Result<PathBuf, CapabilityError>;
}

/// Media transcoder
#[async_trait::async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Extract a mono, 16 kHz, low-bitrate audio track
    async fn extract_audio(&self, video: &Path, output_dir: &Path) -> Result<PathBuf, CapabilityError>;

    /// Write one still image per detected scene change into `output_dir`
    ///
    /// Returns frame paths in presentation order.
    async fn extract_scene_frames(
        &self,
        video: &Path,
        output_dir: &Path,
        threshold: f32,
    ) -> Result<Vec<PathBuf>, CapabilityError>;
}

/// Optical character recognition for a single image
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String, CapabilityError>;
}

/// Speech-to-text API
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, CapabilityError>;
}

/// Image attached to a chat request
#[derive(Debug, Clone)]
pub struct ChatImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Single-turn chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub image: Option<ChatImage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Chat-style text generation (with optional vision input)
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the assistant message content
    async fn complete(&self, request: ChatRequest) -> Result<String, CapabilityError>;
}

/// The full set of collaborators a pipeline run needs
#[derive(Clone)]
pub struct Capabilities {
    pub video_source: Arc<dyn VideoSource>,
    pub transcoder: Arc<dyn MediaTranscoder>,
    pub ocr: Arc<dyn OcrEngine>,
    pub speech_to_text: Arc<dyn SpeechToText>,
    pub chat: Arc<dyn ChatModel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_failures_are_transient() {
        assert!(CapabilityError::Network("connection reset".into()).is_transient());
        assert!(CapabilityError::Timeout("30s".into()).is_transient());
        assert!(!CapabilityError::Api { status: 400, message: "bad".into() }.is_transient());
        assert!(!CapabilityError::Parse("x".into()).is_transient());
        assert!(!CapabilityError::NotConfigured("key".into()).is_transient());
    }
}
