//! recipe-extract library interface
//!
//! Exposes the service, router and models for the binary and integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, JobError, JobResult};

use axum::Router;
use chrono::{DateTime, Utc};
use recipe_common::events::EventBus;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::services::ExtractionService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Job operations and background runs
    pub service: ExtractionService,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, service: ExtractionService) -> Self {
        Self {
            db,
            event_bus,
            service,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::extraction_routes())
        .route("/extractions/events", get(api::extraction_event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
