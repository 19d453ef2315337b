//! Extraction job API handlers
//!
//! POST /extractions, GET /extractions/history, and the per-job routes
//! under /extractions/:job_id. Authentication happens upstream; the caller's
//! user ID arrives in the `X-User-Id` header.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{JobStatusView, RecipeOverrides},
    services::{ExtractionResultView, ImportedRecipe, SubmitOutcome},
    AppState,
};

/// Header carrying the authenticated caller
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller, taken from the `X-User-Id` header
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CurrentUser(value.to_string()))
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))
    }
}

/// POST /extractions request
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
}

/// GET /extractions/history query
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// GET /extractions/history response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub jobs: Vec<JobStatusView>,
}

/// POST /extractions/:job_id/import query
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub recipe_index: usize,
}

/// POST /extractions/:job_id/cancel response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub cancelled: bool,
}

/// POST /extractions
///
/// Returns 202 Accepted; the pipeline runs in the background.
pub async fn submit_extraction(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitOutcome>)> {
    let outcome = state.service.submit(&user_id, &request.url).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// GET /extractions/history?limit=N
pub async fn list_history(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let jobs = state.service.list_history(&user_id, query.limit).await?;
    Ok(Json(HistoryResponse { jobs }))
}

/// GET /extractions/:job_id/status
pub async fn get_status(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusView>> {
    Ok(Json(state.service.get_status(&user_id, job_id).await?))
}

/// GET /extractions/:job_id/result
pub async fn get_result(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<ExtractionResultView>> {
    Ok(Json(state.service.get_result(&user_id, job_id).await?))
}

/// POST /extractions/:job_id/import?recipe_index=N
///
/// The JSON body (field overrides) is optional. An empty body means no
/// overrides; anything else must parse.
pub async fn import_recipe(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(job_id): Path<Uuid>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ImportedRecipe>)> {
    let overrides = parse_overrides(&body)?;
    let imported = state
        .service
        .import_recipe(&user_id, job_id, query.recipe_index, overrides)
        .await?;

    let status = if imported.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(imported)))
}

fn parse_overrides(body: &[u8]) -> ApiResult<RecipeOverrides> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RecipeOverrides::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid recipe overrides: {}", e)))
}

/// POST /extractions/:job_id/cancel
pub async fn cancel_extraction(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    state.service.cancel(&user_id, job_id).await?;
    Ok(Json(CancelResponse {
        job_id,
        cancelled: true,
    }))
}

/// POST /extractions/:job_id/retry
pub async fn retry_extraction(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<SubmitOutcome>)> {
    let outcome = state.service.retry(&user_id, job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// DELETE /extractions/:job_id
pub async fn delete_extraction(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.service.delete_from_history(&user_id, job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build extraction job routes
pub fn extraction_routes() -> Router<AppState> {
    Router::new()
        .route("/extractions", post(submit_extraction))
        .route("/extractions/history", get(list_history))
        .route("/extractions/:job_id", delete(delete_extraction))
        .route("/extractions/:job_id/status", get(get_status))
        .route("/extractions/:job_id/result", get(get_result))
        .route("/extractions/:job_id/import", post(import_recipe))
        .route("/extractions/:job_id/cancel", post(cancel_extraction))
        .route("/extractions/:job_id/retry", post(retry_extraction))
}
