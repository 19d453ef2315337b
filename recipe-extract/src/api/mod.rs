//! HTTP API handlers for recipe-extract
//!
//! REST operations on extraction jobs plus an SSE progress stream.

pub mod extraction;
pub mod health;
pub mod sse;

pub use extraction::{extraction_routes, CurrentUser, USER_ID_HEADER};
pub use health::health_routes;
pub use sse::extraction_event_stream;
