//! Service modules for the recipe extraction pipeline
//!
//! Pipeline stages are plain types over the capability traits in
//! [`crate::types`]; the tool-backed capability implementations live here
//! too. [`ExtractionService`] runs them in order for each job.

pub mod extraction_orchestrator;
pub mod ffmpeg_transcoder;
pub mod frame_sampler;
pub mod inference_client;
pub mod process_runner;
pub mod progress_tracker;
pub mod recipe_synthesizer;
pub mod tesseract_ocr;
pub mod text_prefilter;
pub mod transcriber;
pub mod url_resolver;
pub mod vision_analyzer;
pub mod ytdlp_source;

pub use extraction_orchestrator::{
    ExtractionResultView, ExtractionService, ImportedRecipe, JobWorkspace, SubmitOutcome,
};
pub use ffmpeg_transcoder::FfmpegTranscoder;
pub use inference_client::InferenceClient;
pub use progress_tracker::ProgressTracker;
pub use recipe_synthesizer::{RecipeSynthesizer, SynthesisError};
pub use tesseract_ocr::TesseractOcr;
pub use text_prefilter::{is_recipe_relevant, TextPrefilter};
pub use transcriber::Transcriber;
pub use url_resolver::extract_video_id;
pub use vision_analyzer::VisionAnalyzer;
pub use ytdlp_source::YtDlpSource;
