//! Extraction job persistence
//!
//! Every mutation after creation is guarded by a non-terminal predicate, so
//! a write racing a cancellation (or any other terminal transition) is a
//! no-op. Guarded writes return `false` when no row matched.

use chrono::Utc;
use recipe_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, recipes, to_json};
use crate::models::{
    parse_stored_recipes, ExtractedRecipe, ExtractionJob, JobStatus, NewRecipe, OcrFrameResult,
};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const NON_TERMINAL: &str = "status NOT IN ('COMPLETED', 'FAILED')";

const SELECT_COLUMNS: &str = r#"
    SELECT job_id, user_id, source_url, video_id, status, current_step, progress,
           total_frames, frames_with_text, error_message, video_metadata,
           transcription, ocr_results, extracted_recipes, imported_recipe_ids,
           created_at, started_at, completed_at
    FROM extraction_jobs
"#;

/// Insert a freshly created job
pub async fn insert_job(pool: &SqlitePool, job: &ExtractionJob) -> Result<()> {
    let job_id = job.job_id.to_string();
    let status = job.status.as_str();
    let video_metadata = job
        .video_metadata
        .as_ref()
        .map(|m| to_json(m, "video_metadata"))
        .transpose()?;
    let ocr_results = to_json(&job.ocr_results, "ocr_results")?;
    let imported = to_json(&job.imported_recipe_ids, "imported_recipe_ids")?;
    let created_at = format_timestamp(job.created_at);

    retry_on_lock("insert_job", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO extraction_jobs (
                job_id, user_id, source_url, video_id, status, current_step,
                progress, video_metadata, ocr_results, imported_recipe_ids, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job_id)
        .bind(&job.user_id)
        .bind(&job.source_url)
        .bind(&job.video_id)
        .bind(status)
        .bind(&job.current_step)
        .bind(i64::from(job.progress))
        .bind(&video_metadata)
        .bind(&ocr_results)
        .bind(&imported)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

/// Load a job only if `user_id` owns it
pub async fn load_owned_job(
    pool: &SqlitePool,
    job_id: Uuid,
    user_id: &str,
) -> Result<Option<ExtractionJob>> {
    let query = format!("{} WHERE job_id = ? AND user_id = ?", SELECT_COLUMNS);
    let row = sqlx::query(&query)
        .bind(job_id.to_string())
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Most recent job for (user, video) that has not failed
///
/// A COMPLETED hit makes resubmission idempotent; an in-flight hit blocks it.
pub async fn find_unfailed_for_video(
    pool: &SqlitePool,
    user_id: &str,
    video_id: &str,
) -> Result<Option<ExtractionJob>> {
    let query = format!(
        "{} WHERE user_id = ? AND video_id = ? AND status != 'FAILED'
         ORDER BY created_at DESC, rowid DESC LIMIT 1",
        SELECT_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(video_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Caller's jobs, newest first
pub async fn list_history(pool: &SqlitePool, user_id: &str, limit: u32) -> Result<Vec<ExtractionJob>> {
    let query = format!(
        "{} WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// Advance to a pipeline stage
///
/// Progress never decreases and `started_at` is set on the first transition.
pub async fn update_stage(
    pool: &SqlitePool,
    job_id: Uuid,
    status: JobStatus,
    current_step: &str,
    progress: u8,
) -> Result<bool> {
    let job_id = job_id.to_string();
    let now = format_timestamp(Utc::now());
    let query = format!(
        "UPDATE extraction_jobs
         SET status = ?, current_step = ?, progress = MAX(progress, ?),
             started_at = COALESCE(started_at, ?)
         WHERE job_id = ? AND {}",
        NON_TERMINAL
    );

    retry_on_lock("update_stage", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(&query)
            .bind(status.as_str())
            .bind(current_step)
            .bind(i64::from(progress))
            .bind(&now)
            .bind(&job_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

pub async fn store_transcription(pool: &SqlitePool, job_id: Uuid, transcription: &str) -> Result<bool> {
    let job_id = job_id.to_string();
    let query = format!(
        "UPDATE extraction_jobs SET transcription = ? WHERE job_id = ? AND {}",
        NON_TERMINAL
    );

    retry_on_lock("store_transcription", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(&query)
            .bind(transcription)
            .bind(&job_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

pub async fn store_total_frames(pool: &SqlitePool, job_id: Uuid, total_frames: u32) -> Result<bool> {
    let job_id = job_id.to_string();
    let query = format!(
        "UPDATE extraction_jobs SET total_frames = ? WHERE job_id = ? AND {}",
        NON_TERMINAL
    );

    retry_on_lock("store_total_frames", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(&query)
            .bind(i64::from(total_frames))
            .bind(&job_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Persist pre-filter output; `frames_with_text` is its length
pub async fn store_ocr_results(
    pool: &SqlitePool,
    job_id: Uuid,
    results: &[OcrFrameResult],
) -> Result<bool> {
    let job_id = job_id.to_string();
    let ocr_results = to_json(&results, "ocr_results")?;
    let frames_with_text = results.len() as i64;
    let query = format!(
        "UPDATE extraction_jobs SET ocr_results = ?, frames_with_text = ?
         WHERE job_id = ? AND {}",
        NON_TERMINAL
    );

    retry_on_lock("store_ocr_results", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(&query)
            .bind(&ocr_results)
            .bind(frames_with_text)
            .bind(&job_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Terminal success: recipes stored, progress 100
pub async fn complete_job(
    pool: &SqlitePool,
    job_id: Uuid,
    recipes: &[ExtractedRecipe],
) -> Result<bool> {
    let job_id = job_id.to_string();
    let extracted = to_json(&recipes, "extracted_recipes")?;
    let now = format_timestamp(Utc::now());
    let query = format!(
        "UPDATE extraction_jobs
         SET status = 'COMPLETED', current_step = ?, progress = 100,
             extracted_recipes = ?, completed_at = COALESCE(completed_at, ?)
         WHERE job_id = ? AND {}",
        NON_TERMINAL
    );
    let step = format!("Extracted {} recipe(s)", recipes.len());

    retry_on_lock("complete_job", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(&query)
            .bind(&step)
            .bind(&extracted)
            .bind(&now)
            .bind(&job_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Terminal failure with a message; no-op if the job already ended
pub async fn mark_failed(pool: &SqlitePool, job_id: Uuid, error_message: &str) -> Result<bool> {
    let job_id = job_id.to_string();
    let now = format_timestamp(Utc::now());
    let query = format!(
        "UPDATE extraction_jobs
         SET status = 'FAILED', current_step = 'Failed', error_message = ?,
             completed_at = COALESCE(completed_at, ?)
         WHERE job_id = ? AND {}",
        NON_TERMINAL
    );

    retry_on_lock("mark_failed", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(&query)
            .bind(error_message)
            .bind(&now)
            .bind(&job_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Fail every non-terminal job (orphans of a previous process)
///
/// Returns the affected job IDs.
pub async fn fail_interrupted_jobs(pool: &SqlitePool, error_message: &str) -> Result<Vec<Uuid>> {
    let query = format!("SELECT job_id FROM extraction_jobs WHERE {}", NON_TERMINAL);
    let ids: Vec<String> = sqlx::query_scalar(&query).fetch_all(pool).await?;

    let mut failed = Vec::with_capacity(ids.len());
    for id in ids {
        let job_id = Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid job_id in database: {}", e)))?;
        if mark_failed(pool, job_id, error_message).await? {
            failed.push(job_id);
        }
    }

    Ok(failed)
}

/// Delete a terminal job owned by `user_id`
///
/// Returns `false` if nothing matched (unknown, foreign, or still running).
pub async fn delete_terminal_job(pool: &SqlitePool, job_id: Uuid, user_id: &str) -> Result<bool> {
    let job_id = job_id.to_string();

    retry_on_lock("delete_terminal_job", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            "DELETE FROM extraction_jobs
             WHERE job_id = ? AND user_id = ? AND status IN ('COMPLETED', 'FAILED')",
        )
        .bind(&job_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Outcome of [`record_import`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Created(Uuid),
    /// Index was already imported; no new recipe written
    Existing(Uuid),
}

impl ImportOutcome {
    pub fn recipe_id(&self) -> Uuid {
        match self {
            ImportOutcome::Created(id) | ImportOutcome::Existing(id) => *id,
        }
    }
}

/// Insert the recipe and record it at `recipe_index`, atomically
///
/// Re-reads the import map inside the transaction so a concurrent import
/// of the same index cannot create a duplicate.
pub async fn record_import(
    pool: &SqlitePool,
    job_id: Uuid,
    recipe_index: usize,
    recipe: &NewRecipe,
) -> Result<ImportOutcome> {
    let job_id = job_id.to_string();

    retry_on_lock("record_import", DEFAULT_MAX_LOCK_WAIT_MS, || {
        record_import_once(pool, &job_id, recipe_index, recipe)
    })
    .await
}

async fn record_import_once(
    pool: &SqlitePool,
    job_id: &str,
    recipe_index: usize,
    recipe: &NewRecipe,
) -> Result<ImportOutcome> {
    let mut tx = pool.begin().await?;

    let raw: Option<String> =
        sqlx::query_scalar("SELECT imported_recipe_ids FROM extraction_jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
    let raw = raw.ok_or_else(|| Error::NotFound(format!("Extraction job {}", job_id)))?;
    let mut imported = parse_imported(&raw)?;

    if let Some(existing) = imported.get(&recipe_index) {
        return Ok(ImportOutcome::Existing(*existing));
    }

    recipes::insert_recipe(&mut tx, recipe).await?;

    imported.insert(recipe_index, recipe.recipe_id);
    sqlx::query("UPDATE extraction_jobs SET imported_recipe_ids = ? WHERE job_id = ?")
        .bind(to_json(&imported, "imported_recipe_ids")?)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ImportOutcome::Created(recipe.recipe_id))
}

fn parse_imported(raw: &str) -> Result<BTreeMap<usize, Uuid>> {
    serde_json::from_str(raw)
        .map_err(|e| Error::Internal(format!("Failed to deserialize imported_recipe_ids: {}", e)))
}

fn job_from_row(row: &SqliteRow) -> Result<ExtractionJob> {
    let job_id: String = row.get("job_id");
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|e| Error::Internal(format!("Invalid job_id in database: {}", e)))?;

    let status: String = row.get("status");
    let status: JobStatus = status.parse().map_err(Error::Internal)?;

    let video_metadata: Option<String> = row.get("video_metadata");
    let video_metadata = video_metadata
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize video_metadata: {}", e)))?;

    let ocr_results: String = row.get("ocr_results");
    let ocr_results = serde_json::from_str(&ocr_results)
        .map_err(|e| Error::Internal(format!("Failed to deserialize ocr_results: {}", e)))?;

    let extracted: Option<String> = row.get("extracted_recipes");
    let extracted_recipes = match extracted {
        Some(raw) => parse_stored_recipes(&raw)
            .map_err(|e| Error::Internal(format!("Failed to deserialize extracted_recipes: {}", e)))?,
        None => Vec::new(),
    };

    let imported: String = row.get("imported_recipe_ids");
    let imported_recipe_ids = parse_imported(&imported)?;

    let created_at: String = row.get("created_at");
    let started_at: Option<String> = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    let progress: i64 = row.get("progress");
    let total_frames: Option<i64> = row.get("total_frames");
    let frames_with_text: Option<i64> = row.get("frames_with_text");

    Ok(ExtractionJob {
        job_id,
        user_id: row.get("user_id"),
        source_url: row.get("source_url"),
        video_id: row.get("video_id"),
        status,
        current_step: row.get("current_step"),
        progress: progress.clamp(0, 100) as u8,
        total_frames: total_frames.map(|n| n.max(0) as u32),
        frames_with_text: frames_with_text.map(|n| n.max(0) as u32),
        error_message: row.get("error_message"),
        video_metadata,
        transcription: row.get("transcription"),
        ocr_results,
        extracted_recipes,
        imported_recipe_ids,
        created_at: parse_timestamp(&created_at, "created_at")?,
        started_at: started_at
            .map(|s| parse_timestamp(&s, "started_at"))
            .transpose()?,
        completed_at: completed_at
            .map(|s| parse_timestamp(&s, "completed_at"))
            .transpose()?,
    })
}
