//! Stages 1-3: DOWNLOADING, EXTRACTING_AUDIO, TRANSCRIBING

use super::{ensure_active, ExtractionService, JobWorkspace};
use crate::db;
use crate::models::{ExtractionJob, JobStatus};
use crate::services::transcriber::Transcriber;
use crate::types::ProgressCallback;
use anyhow::{Context, Result};
use chrono::Utc;
use recipe_common::events::ExtractionEvent;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Progress band covered by the download (5% → 25%)
const DOWNLOAD_PROGRESS_START: u8 = 5;
const DOWNLOAD_PROGRESS_SPAN: f32 = 20.0;

/// Output of the acquisition stages
pub(super) struct AcquiredMedia {
    pub video_path: PathBuf,
    pub transcript: String,
}

impl ExtractionService {
    /// Download the video, extract its audio track and transcribe it
    pub(super) async fn phase_acquisition(
        &self,
        job: &ExtractionJob,
        workspace: &JobWorkspace,
    ) -> Result<AcquiredMedia> {
        self.advance(job, JobStatus::Downloading, "Downloading video...", DOWNLOAD_PROGRESS_START)
            .await?;

        let video_path = self
            .capabilities
            .video_source
            .download(&job.video_id, workspace.path(), self.download_progress(job))
            .await
            .context("Video download failed")?;

        tracing::debug!(job_id = %job.job_id, video = %video_path.display(), "Video downloaded");

        self.advance(job, JobStatus::ExtractingAudio, "Extracting audio track...", 30)
            .await?;

        let audio_path = self
            .capabilities
            .transcoder
            .extract_audio(&video_path, workspace.path())
            .await
            .context("Audio extraction failed")?;

        self.advance(job, JobStatus::Transcribing, "Transcribing audio...", 40)
            .await?;

        let transcriber = Transcriber::new(self.capabilities.speech_to_text.clone(), self.transcription_policy);
        let transcript = transcriber
            .transcribe(&audio_path)
            .await
            .context("Transcription failed")?;

        tracing::info!(job_id = %job.job_id, transcript_chars = transcript.len(), "Transcription complete");

        ensure_active(db::jobs::store_transcription(&self.db, job.job_id, &transcript).await?)?;

        Ok(AcquiredMedia {
            video_path,
            transcript,
        })
    }

    /// Mirror download percentage into live progress and the event stream
    ///
    /// Only the in-memory mirror is updated; the database keeps the stage's
    /// starting value until the next transition.
    fn download_progress(&self, job: &ExtractionJob) -> ProgressCallback {
        let progress = self.progress.clone();
        let event_bus = self.event_bus.clone();
        let job_id = job.job_id;
        let user_id = job.user_id.clone();
        let last = Arc::new(AtomicU8::new(DOWNLOAD_PROGRESS_START));

        Arc::new(move |percent: f32| {
            let percent = percent.clamp(0.0, 100.0);
            let value = DOWNLOAD_PROGRESS_START + (percent * DOWNLOAD_PROGRESS_SPAN / 100.0) as u8;

            if last.fetch_max(value, Ordering::SeqCst) >= value {
                return;
            }

            let step = format!("Downloading video... {}%", percent as u8);
            progress.update(job_id, JobStatus::Downloading, step.clone(), value);
            event_bus.emit_lossy(ExtractionEvent::JobProgressUpdate {
                job_id,
                user_id: user_id.clone(),
                status: JobStatus::Downloading.as_str().to_string(),
                current_step: step,
                progress: value,
                timestamp: Utc::now(),
            });
        })
    }
}
