//! Stage 6: AI_SYNTHESIS (vision analysis, then recipe synthesis) and completion

use super::{ensure_active, ExtractionService};
use crate::db;
use crate::models::{ExtractionJob, JobStatus, OcrFrameResult};
use crate::services::recipe_synthesizer::RecipeSynthesizer;
use crate::services::vision_analyzer::VisionAnalyzer;
use anyhow::{Context, Result};
use chrono::Utc;
use recipe_common::events::ExtractionEvent;

impl ExtractionService {
    /// Analyze frames, synthesize recipes and complete the job
    ///
    /// # Returns
    /// Number of recipes stored
    pub(super) async fn phase_synthesis(
        &self,
        job: &ExtractionJob,
        transcript: &str,
        ocr_results: &[OcrFrameResult],
    ) -> Result<usize> {
        let metadata = job
            .video_metadata
            .as_ref()
            .context("Job has no video metadata")?;

        let frame_count = ocr_results.len().min(self.config.max_vision_frames);
        self.advance(
            job,
            JobStatus::AiSynthesis,
            format!("Analyzing {} frames...", frame_count),
            75,
        )
        .await?;

        let analyzer = VisionAnalyzer::new(
            self.capabilities.chat.clone(),
            self.config.vision_model.clone(),
            self.config.max_vision_frames,
        );
        let analyses = analyzer.analyze(ocr_results).await;

        self.advance(job, JobStatus::AiSynthesis, "Synthesizing recipes...", 85)
            .await?;

        let synthesizer = RecipeSynthesizer::new(self.capabilities.chat.clone(), self.config.synthesis_model.clone());
        let recipes = synthesizer.synthesize(transcript, &analyses, metadata).await?;

        ensure_active(db::jobs::complete_job(&self.db, job.job_id, &recipes).await?)?;

        self.progress.update(
            job.job_id,
            JobStatus::Completed,
            format!("Extracted {} recipe(s)", recipes.len()),
            100,
        );

        self.event_bus.emit_lossy(ExtractionEvent::JobCompleted {
            job_id: job.job_id,
            user_id: job.user_id.clone(),
            recipe_count: recipes.len(),
            timestamp: Utc::now(),
        });

        Ok(recipes.len())
    }
}
