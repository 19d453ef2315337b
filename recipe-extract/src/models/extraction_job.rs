//! Extraction job state machine
//!
//! A job progresses through the pipeline stages in a fixed order:
//! PENDING → DOWNLOADING → EXTRACTING_AUDIO → TRANSCRIBING → EXTRACTING_FRAMES
//! → OCR_PROCESSING → AI_SYNTHESIS → COMPLETED
//!
//! FAILED is reachable from every non-terminal state. No state is re-entered:
//! a retry is a brand new job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{ExtractedRecipe, OcrFrameResult, VideoMetadata};

/// Error message recorded when the owner cancels a running job
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

/// Error message recorded for jobs orphaned by a process restart
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by service restart";

/// Extraction job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Persisted, background processing not yet started
    Pending,
    /// Video download in progress
    Downloading,
    /// Transcoding the audio track
    ExtractingAudio,
    /// Speech-to-text call in progress
    Transcribing,
    /// Scene-change frame extraction
    ExtractingFrames,
    /// OCR pre-filter over extracted frames
    OcrProcessing,
    /// Vision analysis and recipe synthesis
    AiSynthesis,
    /// Recipes available
    Completed,
    /// Pipeline failed or was cancelled
    Failed,
}

impl JobStatus {
    /// Pipeline order, used to reject backwards transitions
    const ORDER: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Downloading,
        JobStatus::ExtractingAudio,
        JobStatus::Transcribing,
        JobStatus::ExtractingFrames,
        JobStatus::OcrProcessing,
        JobStatus::AiSynthesis,
        JobStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Downloading => "DOWNLOADING",
            JobStatus::ExtractingAudio => "EXTRACTING_AUDIO",
            JobStatus::Transcribing => "TRANSCRIBING",
            JobStatus::ExtractingFrames => "EXTRACTING_FRAMES",
            JobStatus::OcrProcessing => "OCR_PROCESSING",
            JobStatus::AiSynthesis => "AI_SYNTHESIS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    ///
    /// Terminal states have no successors; FAILED may follow any other state;
    /// otherwise only strictly later pipeline stages are allowed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Failed {
            return true;
        }
        match (self.position(), next.position()) {
            (Some(current), Some(candidate)) => candidate > current,
            _ => false,
        }
    }

    fn position(&self) -> Option<usize> {
        Self::ORDER.iter().position(|s| s == self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "DOWNLOADING" => Ok(JobStatus::Downloading),
            "EXTRACTING_AUDIO" => Ok(JobStatus::ExtractingAudio),
            "TRANSCRIBING" => Ok(JobStatus::Transcribing),
            "EXTRACTING_FRAMES" => Ok(JobStatus::ExtractingFrames),
            "OCR_PROCESSING" => Ok(JobStatus::OcrProcessing),
            "AI_SYNTHESIS" => Ok(JobStatus::AiSynthesis),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// Persisted extraction job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub job_id: Uuid,
    pub user_id: String,
    pub source_url: String,
    pub video_id: String,

    pub status: JobStatus,
    pub current_step: String,
    /// Percentage complete (0-100), non-decreasing within a run
    pub progress: u8,
    pub total_frames: Option<u32>,
    pub frames_with_text: Option<u32>,
    /// Set only on failure
    pub error_message: Option<String>,

    /// Fetched once at submission, immutable thereafter
    pub video_metadata: Option<VideoMetadata>,
    pub transcription: Option<String>,
    pub ocr_results: Vec<OcrFrameResult>,
    pub extracted_recipes: Vec<ExtractedRecipe>,
    /// Recipe index → imported recipe ID; absent until that recipe is imported
    pub imported_recipe_ids: BTreeMap<usize, Uuid>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExtractionJob {
    /// Create new PENDING job
    pub fn new(
        user_id: impl Into<String>,
        source_url: impl Into<String>,
        video_id: impl Into<String>,
        video_metadata: VideoMetadata,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            user_id: user_id.into(),
            source_url: source_url.into(),
            video_id: video_id.into(),
            status: JobStatus::Pending,
            current_step: "Waiting to start...".to_string(),
            progress: 0,
            total_frames: None,
            frames_with_text: None,
            error_message: None,
            video_metadata: Some(video_metadata),
            transcription: None,
            ocr_results: Vec::new(),
            extracted_recipes: Vec::new(),
            imported_recipe_ids: BTreeMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Import state aligned by index with `extracted_recipes`
    pub fn imported_slots(&self) -> Vec<Option<Uuid>> {
        (0..self.extracted_recipes.len())
            .map(|index| self.imported_recipe_ids.get(&index).copied())
            .collect()
    }
}

/// Live, process-local mirror of a running job's mutable fields
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub current_step: String,
    pub progress: u8,
    pub total_frames: Option<u32>,
    pub frames_with_text: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

impl JobProgress {
    pub fn new(status: JobStatus, current_step: impl Into<String>, progress: u8) -> Self {
        Self {
            status,
            current_step: current_step.into(),
            progress,
            total_frames: None,
            frames_with_text: None,
            updated_at: Utc::now(),
        }
    }
}

/// Status snapshot returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub current_step: String,
    pub progress: u8,
    pub total_frames: Option<u32>,
    pub frames_with_text: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub source_url: String,
    pub video_id: String,
    pub video_title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatusView {
    /// Build from the persisted record, letting live progress win when present
    pub fn merge(job: &ExtractionJob, live: Option<&JobProgress>) -> Self {
        let mut view = Self {
            job_id: job.job_id,
            status: job.status,
            current_step: job.current_step.clone(),
            progress: job.progress,
            total_frames: job.total_frames,
            frames_with_text: job.frames_with_text,
            error_message: job.error_message.clone(),
            source_url: job.source_url.clone(),
            video_id: job.video_id.clone(),
            video_title: job.video_metadata.as_ref().map(|m| m.title.clone()),
            thumbnail_url: job.video_metadata.as_ref().map(|m| m.thumbnail_url.clone()),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        };

        // A terminal record is authoritative over any stale live entry
        if let Some(live) = live.filter(|_| !job.is_terminal()) {
            view.status = live.status;
            view.current_step = live.current_step.clone();
            view.progress = live.progress.max(job.progress);
            view.total_frames = live.total_frames.or(job.total_frames);
            view.frames_with_text = live.frames_with_text.or(job.frames_with_text);
        }

        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "Pasta".to_string(),
            duration_seconds: 120,
            channel: "Chef".to_string(),
            thumbnail_url: "https://img/1.jpg".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ORDER.iter().chain([JobStatus::Failed].iter()) {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), *status);
        }
        assert!("RUNNING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Downloading));
        assert!(JobStatus::Downloading.can_transition_to(JobStatus::Transcribing));
        assert!(!JobStatus::Transcribing.can_transition_to(JobStatus::Downloading));
        assert!(!JobStatus::Downloading.can_transition_to(JobStatus::Downloading));
        assert!(JobStatus::OcrProcessing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = ExtractionJob::new("u1", "https://youtu.be/abcdefghijk", "abcdefghijk", metadata());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_live_progress_wins_over_persisted_snapshot() {
        let mut job = ExtractionJob::new("u1", "url", "abcdefghijk", metadata());
        job.status = JobStatus::Downloading;
        job.progress = 5;

        let mut live = JobProgress::new(JobStatus::Downloading, "Downloading video... 50%", 15);
        live.total_frames = Some(12);

        let view = JobStatusView::merge(&job, Some(&live));
        assert_eq!(view.progress, 15);
        assert_eq!(view.current_step, "Downloading video... 50%");
        assert_eq!(view.total_frames, Some(12));
        assert_eq!(view.video_title.as_deref(), Some("Pasta"));
    }

    #[test]
    fn test_terminal_record_ignores_live_progress() {
        let mut job = ExtractionJob::new("u1", "url", "abcdefghijk", metadata());
        job.status = JobStatus::Failed;
        job.error_message = Some(CANCELLED_MESSAGE.to_string());

        let live = JobProgress::new(JobStatus::Transcribing, "Transcribing audio...", 40);
        let view = JobStatusView::merge(&job, Some(&live));
        assert_eq!(view.status, JobStatus::Failed);
    }

    #[test]
    fn test_imported_slots_align_with_recipes() {
        let mut job = ExtractionJob::new("u1", "url", "abcdefghijk", metadata());
        job.extracted_recipes = vec![ExtractedRecipe::default(); 3];
        let recipe_id = Uuid::new_v4();
        job.imported_recipe_ids.insert(1, recipe_id);

        assert_eq!(job.imported_slots(), vec![None, Some(recipe_id), None]);
    }
}
