//! Error types for recipe-extract
//!
//! `JobError` is the caller-visible taxonomy of the synchronous operations
//! (submit, status, result, import, cancel, retry, delete). `ApiError` maps it
//! onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors raised directly to the caller of a job operation
#[derive(Debug, Error)]
pub enum JobError {
    /// Unknown job, or a job owned by someone else (never distinguished)
    #[error("Extraction job not found")]
    NotFound,

    #[error("Invalid or unsupported video URL: {0}")]
    InvalidUrl(String),

    #[error("Could not fetch video information: {0}")]
    MetadataUnavailable(String),

    #[error("Video is too long ({actual_minutes} min). Maximum allowed duration is {max_minutes} min")]
    DurationExceeded { actual_minutes: u64, max_minutes: u64 },

    #[error("This video is already being processed")]
    AlreadyProcessing,

    /// Operation not valid for the job's current status
    #[error("{0}")]
    InvalidState(String),

    #[error("Invalid recipe index {index}: job has {available} extracted recipe(s)")]
    InvalidRecipeIndex { index: usize, available: usize },

    #[error(transparent)]
    Common(#[from] recipe_common::Error),
}

/// Result type for job operations
pub type JobResult<T> = Result<T, JobError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing caller identity (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict (409) - e.g., video already being processed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation invalid for current job state (409)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// recipe-common error
    #[error("Common error: {0}")]
    Common(#[from] recipe_common::Error),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound => ApiError::NotFound(err.to_string()),
            JobError::InvalidUrl(_)
            | JobError::MetadataUnavailable(_)
            | JobError::DurationExceeded { .. }
            | JobError::InvalidRecipeIndex { .. } => ApiError::BadRequest(err.to_string()),
            JobError::AlreadyProcessing => ApiError::Conflict(err.to_string()),
            JobError::InvalidState(msg) => ApiError::InvalidState(msg),
            JobError::Common(inner) => ApiError::Common(inner),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::InvalidState(msg) => (StatusCode::CONFLICT, "INVALID_STATE", msg),
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "Request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMMON_ERROR",
                    err.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
