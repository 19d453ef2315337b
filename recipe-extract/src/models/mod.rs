//! Data models for recipe-extract
//!
//! - Extraction job state machine and live progress
//! - Extracted recipe structures and import records
//! - Video-derived pipeline data (metadata, frames, OCR, vision output)

pub mod extraction_job;
pub mod recipe;
pub mod video;

pub use extraction_job::{
    ExtractionJob, JobProgress, JobStatus, JobStatusView, CANCELLED_MESSAGE, INTERRUPTED_MESSAGE,
};
pub use recipe::{
    parse_stored_recipes, ExtractedRecipe, NewRecipe, RecipeComponent, RecipeIngredient,
    RecipeOverrides, RecipeStep,
};
pub use video::{FrameAnalysis, OcrFrameResult, SampledFrame, VideoMetadata};
