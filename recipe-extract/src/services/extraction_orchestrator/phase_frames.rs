//! Stages 4-5: EXTRACTING_FRAMES, OCR_PROCESSING

use super::{ensure_active, ExtractionService, JobWorkspace};
use crate::db;
use crate::models::{ExtractionJob, JobStatus, OcrFrameResult};
use crate::services::frame_sampler::sample_frames;
use crate::services::text_prefilter::TextPrefilter;
use anyhow::{Context, Result};
use std::path::Path;

impl ExtractionService {
    /// Sample scene-change frames and keep the ones with recipe text
    ///
    /// Zero frames, or zero relevant frames, is not an error: synthesis can
    /// still work from the transcript and description.
    pub(super) async fn phase_frames(
        &self,
        job: &ExtractionJob,
        workspace: &JobWorkspace,
        video_path: &Path,
    ) -> Result<Vec<OcrFrameResult>> {
        self.advance(job, JobStatus::ExtractingFrames, "Detecting scene changes...", 55)
            .await?;

        let frames_dir = workspace.frames_dir();
        tokio::fs::create_dir_all(&frames_dir)
            .await
            .context("Failed to create frames directory")?;

        let duration_seconds = job
            .video_metadata
            .as_ref()
            .map(|m| m.duration_seconds)
            .unwrap_or(0);

        let frames = sample_frames(
            self.capabilities.transcoder.as_ref(),
            video_path,
            &frames_dir,
            self.config.scene_threshold,
            duration_seconds,
        )
        .await
        .context("Frame extraction failed")?;

        let total_frames = frames.len() as u32;
        ensure_active(db::jobs::store_total_frames(&self.db, job.job_id, total_frames).await?)?;
        self.progress.set_total_frames(job.job_id, total_frames);

        tracing::info!(job_id = %job.job_id, total_frames, "Scene-change frames extracted");

        self.advance(
            job,
            JobStatus::OcrProcessing,
            format!("Reading on-screen text ({} frames)...", total_frames),
            65,
        )
        .await?;

        let prefilter = TextPrefilter::new(self.capabilities.ocr.clone(), self.config.ocr_batch_size);
        let relevant = prefilter.filter(&frames).await;

        ensure_active(db::jobs::store_ocr_results(&self.db, job.job_id, &relevant).await?)?;
        self.progress.set_frames_with_text(job.job_id, relevant.len() as u32);

        Ok(relevant)
    }
}
