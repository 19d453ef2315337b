//! Video-derived data passed between pipeline stages

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Video information fetched once at submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub duration_seconds: u64,
    pub channel: String,
    pub thumbnail_url: String,
    pub description: Option<String>,
}

/// Still frame emitted by the scene-change sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    pub path: PathBuf,
    /// Position in presentation order (0-based)
    pub index: usize,
    /// Approximate, derived from the ordinal position
    pub timestamp_seconds: f64,
}

/// Frame that passed the OCR relevance pre-filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFrameResult {
    /// Frame file name within the job directory
    pub frame: String,
    pub timestamp_seconds: f64,
    pub text: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Structured fragments read from one frame by the vision model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub timestamp_seconds: f64,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub other_text: String,
}

impl FrameAnalysis {
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty() && self.steps.is_empty() && self.other_text.trim().is_empty()
    }
}
