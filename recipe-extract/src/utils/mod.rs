//! Utility modules for recipe-extract

pub mod backoff;
pub mod db_retry;
pub mod json;

pub use backoff::{retry_with_backoff, RetryPolicy};
pub use db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
pub use json::strip_code_fences;
