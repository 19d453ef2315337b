//! Extraction job orchestrator
//!
//! # State Progression
//! PENDING → DOWNLOADING → EXTRACTING_AUDIO → TRANSCRIBING → EXTRACTING_FRAMES
//! → OCR_PROCESSING → AI_SYNTHESIS → COMPLETED, with FAILED reachable from
//! any non-terminal state.
//!
//! # Architecture
//! Synchronous operations (submit, status, result, import, cancel, retry,
//! delete, history) run on the caller's task and raise [`JobError`].
//! Submit spawns the background run, which executes the `phase_*` methods
//! in order:
//!
//! - **phase_acquisition**: download, audio track, transcription
//! - **phase_frames**: scene-change frames, OCR pre-filter
//! - **phase_synthesis**: vision analysis, recipe synthesis, completion
//!
//! A run ends in exactly one place ([`ExtractionService::run_job`]): it
//! records the failure (if any), removes the job directory and forgets
//! the job's live progress and cancellation token.
//!
//! # Cancellation
//! Each run owns a `CancellationToken`. Cancel persists FAILED first, then
//! fires the token; the run drops its in-flight stage (spawned tools are
//! killed on drop) and never writes its own failure record. Every stage
//! write is guarded by the job still being non-terminal, and a write that
//! matches nothing stops the run the same way.

mod phase_acquisition;
mod phase_frames;
mod phase_synthesis;
mod workspace;

pub use workspace::JobWorkspace;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use recipe_common::events::{EventBus, ExtractionEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ExtractConfig;
use crate::db;
use crate::db::jobs::ImportOutcome;
use crate::error::{JobError, JobResult};
use crate::models::{
    ExtractedRecipe, ExtractionJob, JobProgress, JobStatus, JobStatusView, NewRecipe,
    RecipeOverrides, VideoMetadata, CANCELLED_MESSAGE, INTERRUPTED_MESSAGE,
};
use crate::services::progress_tracker::ProgressTracker;
use crate::services::url_resolver::extract_video_id;
use crate::types::Capabilities;
use crate::utils::RetryPolicy;

/// Default and maximum page size for history listing
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// Stage write matched no row: the job was cancelled or otherwise finished
#[derive(Debug, thiserror::Error)]
#[error("Extraction job is no longer active")]
pub(crate) struct JobInactive;

/// Result of [`ExtractionService::submit`]
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    /// An existing completed job for the same video was returned
    pub reused: bool,
}

/// Result of [`ExtractionService::import_recipe`]
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImportedRecipe {
    pub recipe_id: Uuid,
    /// False when the index had already been imported
    pub created: bool,
}

/// Completed extraction returned to the owner
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResultView {
    pub job_id: Uuid,
    pub source_url: String,
    pub video_id: String,
    pub video_metadata: Option<VideoMetadata>,
    pub transcription: Option<String>,
    pub recipes: Vec<ExtractedRecipe>,
    /// Aligned with `recipes`; `null` until that recipe is imported
    pub imported_recipe_ids: Vec<Option<Uuid>>,
    pub total_frames: Option<u32>,
    pub frames_with_text: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Extraction job service
///
/// Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ExtractionService {
    db: SqlitePool,
    event_bus: EventBus,
    config: Arc<ExtractConfig>,
    capabilities: Capabilities,
    jobs_root: PathBuf,
    progress: ProgressTracker,
    /// Tokens of runs executing in this process
    cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Serializes the duplicate check with job creation
    submit_lock: Arc<Mutex<()>>,
    transcription_policy: RetryPolicy,
    /// Most recent pipeline failure, for diagnostics
    last_error: Arc<RwLock<Option<String>>>,
}

impl ExtractionService {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        config: ExtractConfig,
        capabilities: Capabilities,
        jobs_root: PathBuf,
    ) -> Self {
        Self {
            db,
            event_bus,
            config: Arc::new(config),
            capabilities,
            jobs_root,
            progress: ProgressTracker::new(),
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            submit_lock: Arc::new(Mutex::new(())),
            transcription_policy: RetryPolicy::default(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Override the transcription retry policy
    pub fn with_transcription_policy(mut self, policy: RetryPolicy) -> Self {
        self.transcription_policy = policy;
        self
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Whether a run for this job is executing in this process
    pub async fn is_running(&self, job_id: Uuid) -> bool {
        self.cancellation_tokens.read().await.contains_key(&job_id)
    }

    pub async fn active_job_count(&self) -> usize {
        self.cancellation_tokens.read().await.len()
    }

    /// Submit a video URL for extraction
    ///
    /// Returns immediately after the job is persisted; the pipeline runs in
    /// the background. A completed job for the same video is returned as is.
    pub async fn submit(&self, user_id: &str, url: &str) -> JobResult<SubmitOutcome> {
        let url = url.trim();
        let video_id = extract_video_id(url).ok_or_else(|| JobError::InvalidUrl(url.to_string()))?;

        if let Some(existing) = self.check_duplicate(user_id, &video_id).await? {
            return Ok(existing);
        }

        let metadata = self
            .capabilities
            .video_source
            .fetch_metadata(&video_id)
            .await
            .map_err(|e| {
                tracing::warn!(video_id = %video_id, error = %e, "Metadata fetch failed");
                JobError::MetadataUnavailable(e.to_string())
            })?;

        let max_seconds = self.config.max_video_duration_seconds;
        if metadata.duration_seconds > max_seconds {
            return Err(JobError::DurationExceeded {
                actual_minutes: metadata.duration_seconds.div_ceil(60),
                max_minutes: max_seconds / 60,
            });
        }

        let job = {
            let _guard = self.submit_lock.lock().await;

            // Re-check: another submit may have won while metadata was fetched
            if let Some(existing) = self.check_duplicate(user_id, &video_id).await? {
                return Ok(existing);
            }

            let job = ExtractionJob::new(user_id, url, video_id, metadata);
            db::jobs::insert_job(&self.db, &job).await?;
            job
        };

        tracing::info!(
            job_id = %job.job_id,
            user_id = %job.user_id,
            video_id = %job.video_id,
            duration_seconds = job.video_metadata.as_ref().map(|m| m.duration_seconds),
            "Extraction job created"
        );

        self.event_bus.emit_lossy(ExtractionEvent::JobSubmitted {
            job_id: job.job_id,
            user_id: job.user_id.clone(),
            video_id: job.video_id.clone(),
            timestamp: Utc::now(),
        });

        let job_id = job.job_id;
        self.spawn_run(job).await;

        Ok(SubmitOutcome { job_id, reused: false })
    }

    /// Completed job → reuse; in-flight job → reject; none or failed → proceed
    async fn check_duplicate(&self, user_id: &str, video_id: &str) -> JobResult<Option<SubmitOutcome>> {
        match db::jobs::find_unfailed_for_video(&self.db, user_id, video_id).await? {
            Some(job) if job.status == JobStatus::Completed => {
                tracing::info!(job_id = %job.job_id, video_id, "Returning existing completed extraction");
                Ok(Some(SubmitOutcome {
                    job_id: job.job_id,
                    reused: true,
                }))
            }
            Some(job) => {
                tracing::info!(job_id = %job.job_id, status = %job.status, video_id, "Video already being processed");
                Err(JobError::AlreadyProcessing)
            }
            None => Ok(None),
        }
    }

    /// Status snapshot; live progress wins over the last persisted write
    pub async fn get_status(&self, user_id: &str, job_id: Uuid) -> JobResult<JobStatusView> {
        let job = self.load_owned(user_id, job_id).await?;
        let live = self.progress.get(job_id);
        Ok(JobStatusView::merge(&job, live.as_ref()))
    }

    /// Recipes, transcript and import state of a completed job
    pub async fn get_result(&self, user_id: &str, job_id: Uuid) -> JobResult<ExtractionResultView> {
        let job = self.load_owned(user_id, job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(JobError::InvalidState(format!(
                "Extraction is not yet complete (status: {})",
                job.status
            )));
        }

        Ok(ExtractionResultView {
            imported_recipe_ids: job.imported_slots(),
            job_id: job.job_id,
            source_url: job.source_url,
            video_id: job.video_id,
            video_metadata: job.video_metadata,
            transcription: job.transcription,
            recipes: job.extracted_recipes,
            total_frames: job.total_frames,
            frames_with_text: job.frames_with_text,
            completed_at: job.completed_at,
        })
    }

    /// Import one extracted recipe; repeated calls return the same recipe
    pub async fn import_recipe(
        &self,
        user_id: &str,
        job_id: Uuid,
        recipe_index: usize,
        overrides: RecipeOverrides,
    ) -> JobResult<ImportedRecipe> {
        let job = self.load_owned(user_id, job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(JobError::InvalidState(
                "Recipes can only be imported from a completed extraction".to_string(),
            ));
        }

        let recipe = job
            .extracted_recipes
            .get(recipe_index)
            .ok_or(JobError::InvalidRecipeIndex {
                index: recipe_index,
                available: job.extracted_recipes.len(),
            })?;

        if let Some(existing) = job.imported_recipe_ids.get(&recipe_index) {
            return Ok(ImportedRecipe {
                recipe_id: *existing,
                created: false,
            });
        }

        let new_recipe = NewRecipe::from_extraction(&job, recipe, overrides);
        let outcome = db::jobs::record_import(&self.db, job_id, recipe_index, &new_recipe).await?;

        if let ImportOutcome::Created(recipe_id) = outcome {
            tracing::info!(
                job_id = %job_id,
                recipe_index,
                recipe_id = %recipe_id,
                title = %new_recipe.title,
                "Imported extracted recipe"
            );
        }

        Ok(ImportedRecipe {
            recipe_id: outcome.recipe_id(),
            created: matches!(outcome, ImportOutcome::Created(_)),
        })
    }

    /// Force a running job to FAILED with the cancellation message
    pub async fn cancel(&self, user_id: &str, job_id: Uuid) -> JobResult<()> {
        let job = self.load_owned(user_id, job_id).await?;
        if job.is_terminal() {
            return Err(JobError::InvalidState(format!(
                "Job is already finished (status: {})",
                job.status
            )));
        }

        if !db::jobs::mark_failed(&self.db, job_id, CANCELLED_MESSAGE).await? {
            // Finished between the read and the write
            return Err(JobError::InvalidState("Job is already finished".to_string()));
        }

        self.progress.remove(job_id);

        let token = self.cancellation_tokens.read().await.get(&job_id).cloned();
        match token {
            // The run removes its own directory as it unwinds
            Some(token) => token.cancel(),
            None => JobWorkspace::remove_orphaned(&self.jobs_root, job_id).await,
        }

        tracing::info!(job_id = %job_id, user_id, "Extraction job cancelled");

        self.event_bus.emit_lossy(ExtractionEvent::JobCancelled {
            job_id,
            user_id: job.user_id,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Resubmit a failed job's URL as a brand new job
    pub async fn retry(&self, user_id: &str, job_id: Uuid) -> JobResult<SubmitOutcome> {
        let job = self.load_owned(user_id, job_id).await?;
        if job.status != JobStatus::Failed {
            return Err(JobError::InvalidState(format!(
                "Only failed jobs can be retried (status: {})",
                job.status
            )));
        }

        tracing::info!(job_id = %job_id, video_id = %job.video_id, "Retrying failed extraction");
        self.submit(user_id, &job.source_url).await
    }

    /// Remove a finished job from history
    pub async fn delete_from_history(&self, user_id: &str, job_id: Uuid) -> JobResult<()> {
        let job = self.load_owned(user_id, job_id).await?;
        if !job.is_terminal() {
            return Err(JobError::InvalidState(
                "Job is still in progress; cancel it before deleting".to_string(),
            ));
        }

        if !db::jobs::delete_terminal_job(&self.db, job_id, user_id).await? {
            return Err(JobError::NotFound);
        }

        tracing::info!(job_id = %job_id, user_id, "Extraction job deleted from history");
        Ok(())
    }

    /// Caller's jobs, newest first; `limit` is clamped to 1..=100
    pub async fn list_history(&self, user_id: &str, limit: Option<u32>) -> JobResult<Vec<JobStatusView>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let jobs = db::jobs::list_history(&self.db, user_id, limit).await?;
        Ok(jobs
            .iter()
            .map(|job| JobStatusView::merge(job, self.progress.get(job.job_id).as_ref()))
            .collect())
    }

    /// Fail jobs orphaned by a previous process so they can be retried
    pub async fn recover_interrupted_jobs(&self) -> JobResult<usize> {
        let orphaned = db::jobs::fail_interrupted_jobs(&self.db, INTERRUPTED_MESSAGE).await?;

        for job_id in &orphaned {
            JobWorkspace::remove_orphaned(&self.jobs_root, *job_id).await;
        }

        if !orphaned.is_empty() {
            tracing::warn!(count = orphaned.len(), "Marked interrupted extraction jobs as failed");
        }

        Ok(orphaned.len())
    }

    async fn load_owned(&self, user_id: &str, job_id: Uuid) -> JobResult<ExtractionJob> {
        db::jobs::load_owned_job(&self.db, job_id, user_id)
            .await?
            .ok_or(JobError::NotFound)
    }

    /// Register the run's token and live progress, then start it
    async fn spawn_run(&self, job: ExtractionJob) {
        let job_id = job.job_id;
        let token = CancellationToken::new();

        self.cancellation_tokens.write().await.insert(job_id, token.clone());
        self.progress.start(
            job_id,
            JobProgress::new(JobStatus::Pending, job.current_step.clone(), 0),
        );

        let service = self.clone();
        tokio::spawn(async move {
            tracing::info!(job_id = %job_id, "Background extraction task started");
            service.run_job(job, token).await;
        });
    }

    /// Execute the pipeline and funnel every outcome through one exit path
    async fn run_job(&self, job: ExtractionJob, token: CancellationToken) {
        let job_id = job.job_id;
        let started = std::time::Instant::now();

        match JobWorkspace::create(&self.jobs_root, job_id).await {
            Ok(workspace) => {
                // A panicking capability must still fail the job and release its resources
                let pipeline = AssertUnwindSafe(self.execute_pipeline(&job, &workspace))
                    .catch_unwind()
                    .map(|result| {
                        result.unwrap_or_else(|panic| {
                            Err(anyhow::anyhow!("Pipeline panicked: {}", panic_message(&*panic)))
                        })
                    });

                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(anyhow::Error::new(JobInactive)),
                    result = pipeline => result,
                };

                match outcome {
                    Ok(recipe_count) => tracing::info!(
                        job_id = %job_id,
                        recipe_count,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Extraction job completed"
                    ),
                    Err(e) if e.is::<JobInactive>() => tracing::info!(
                        job_id = %job_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Extraction run stopped: job no longer active"
                    ),
                    Err(e) => self.record_failure(&job, &e).await,
                }

                workspace.remove().await;
            }
            Err(e) => {
                let e = anyhow::Error::new(e).context("Failed to create job directory");
                self.record_failure(&job, &e).await;
            }
        }

        self.progress.remove(job_id);
        self.cancellation_tokens.write().await.remove(&job_id);
    }

    /// The single place a pipeline error becomes a FAILED record
    async fn record_failure(&self, job: &ExtractionJob, error: &anyhow::Error) {
        let message = format!("{:#}", error);

        tracing::error!(job_id = %job.job_id, video_id = %job.video_id, error = %message, "Extraction job failed");
        *self.last_error.write().await = Some(message.clone());

        match db::jobs::mark_failed(&self.db, job.job_id, &message).await {
            Ok(true) => self.event_bus.emit_lossy(ExtractionEvent::JobFailed {
                job_id: job.job_id,
                user_id: job.user_id.clone(),
                error: message,
                timestamp: Utc::now(),
            }),
            Ok(false) => tracing::debug!(job_id = %job.job_id, "Job already terminal, failure not recorded"),
            Err(db_err) => tracing::error!(
                job_id = %job.job_id,
                error = %db_err,
                "Could not persist job failure"
            ),
        }
    }

    async fn execute_pipeline(&self, job: &ExtractionJob, workspace: &JobWorkspace) -> anyhow::Result<usize> {
        let acquired = self.phase_acquisition(job, workspace).await?;
        let ocr_results = self.phase_frames(job, workspace, &acquired.video_path).await?;
        self.phase_synthesis(job, &acquired.transcript, &ocr_results).await
    }

    /// Persist and mirror a stage transition
    ///
    /// Fails with [`JobInactive`] when the job is no longer running.
    async fn advance(
        &self,
        job: &ExtractionJob,
        status: JobStatus,
        current_step: impl Into<String>,
        progress: u8,
    ) -> anyhow::Result<()> {
        let current_step = current_step.into();

        if let Some(live) = self.progress.get(job.job_id) {
            if live.status != status && !live.status.can_transition_to(status) {
                anyhow::bail!("Invalid stage transition {} -> {}", live.status, status);
            }
        }

        if !db::jobs::update_stage(&self.db, job.job_id, status, &current_step, progress).await? {
            return Err(JobInactive.into());
        }
        self.progress.update(job.job_id, status, current_step.clone(), progress);

        tracing::info!(job_id = %job.job_id, stage = %status, progress, "{}", current_step);

        self.event_bus.emit_lossy(ExtractionEvent::JobProgressUpdate {
            job_id: job.job_id,
            user_id: job.user_id.clone(),
            status: status.as_str().to_string(),
            current_step,
            progress,
            timestamp: Utc::now(),
        });

        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Turn a guarded write's `false` into [`JobInactive`]
fn ensure_active(written: bool) -> anyhow::Result<()> {
    if written {
        Ok(())
    } else {
        Err(JobInactive.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    // Compiles only while the background run can be handed to tokio::spawn
    #[allow(dead_code)]
    fn run_job_future_is_send(service: ExtractionService, job: ExtractionJob) {
        let run = async move { service.run_job(job, CancellationToken::new()).await };
        assert_send(&run);
    }

    #[test]
    fn test_panic_message_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(&*boxed), "owned boom");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*boxed), "unknown panic payload");
    }
}
