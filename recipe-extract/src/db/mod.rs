//! Database access for recipe-extract
//!
//! SQLite file `recipes.db` in the root folder. Job and recipe tables are
//! created on startup.

pub mod jobs;
pub mod recipes;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create extraction_jobs and recipes tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extraction_jobs (
            job_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            source_url TEXT NOT NULL,
            video_id TEXT NOT NULL,
            status TEXT NOT NULL,
            current_step TEXT NOT NULL DEFAULT '',
            progress INTEGER NOT NULL DEFAULT 0,
            total_frames INTEGER,
            frames_with_text INTEGER,
            error_message TEXT,
            video_metadata TEXT,
            transcription TEXT,
            ocr_results TEXT NOT NULL DEFAULT '[]',
            extracted_recipes TEXT,
            imported_recipe_ids TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_extraction_jobs_user_video
         ON extraction_jobs (user_id, video_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_extraction_jobs_user_created
         ON extraction_jobs (user_id, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            recipe_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            prep_time_minutes INTEGER,
            cook_time_minutes INTEGER,
            servings INTEGER,
            difficulty TEXT,
            category TEXT,
            cuisine TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            components TEXT NOT NULL DEFAULT '[]',
            source_type TEXT NOT NULL,
            source_url TEXT NOT NULL,
            source_video_id TEXT NOT NULL,
            source_channel TEXT,
            source_thumbnail_url TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (extraction_jobs, recipes)");

    Ok(())
}

/// Fixed-width UTC timestamp so text ordering matches time ordering
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str, column: &str) -> recipe_common::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| recipe_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T, column: &str) -> recipe_common::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| recipe_common::Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}
