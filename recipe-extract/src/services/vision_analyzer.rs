//! Per-frame vision analysis
//!
//! A bounded, evenly spaced subset of text-bearing frames is sent to an
//! image-understanding model. Each frame is independent: an unparseable
//! answer yields an empty analysis and a failed call drops only that frame.

use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::models::{FrameAnalysis, OcrFrameResult};
use crate::types::{ChatImage, ChatModel, ChatRequest};
use crate::utils::strip_code_fences;

/// Concurrent vision calls per job
const VISION_CONCURRENCY: usize = 3;

const SYSTEM_PROMPT: &str = r#"You read frames from cooking videos.
Extract any recipe information visible in the image: ingredient lists with quantities, and preparation steps shown as on-screen text.
The OCR text supplied with the image is noisy; use it only to disambiguate what you can see.
Respond with ONLY a JSON object of this exact shape and nothing else:
{"ingredients": ["2 cups flour", ...], "steps": ["Whisk the eggs", ...], "otherText": "any other relevant text"}
Use empty arrays and an empty string when nothing relevant is visible."#;

/// Lenient shape of the model's JSON answer
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    ingredients: Vec<Value>,
    steps: Vec<Value>,
    #[serde(alias = "otherText", alias = "other")]
    other_text: Option<Value>,
}

/// Pick at most `max` items spread evenly across `items`
///
/// Index `i` of the result is `floor(i * n / max)`, so the first item is
/// always included and coverage spans the whole input.
pub fn select_evenly_spaced<T: Clone>(items: &[T], max: usize) -> Vec<T> {
    let n = items.len();
    if max == 0 {
        return Vec::new();
    }
    if n <= max {
        return items.to_vec();
    }
    (0..max).map(|i| items[i * n / max].clone()).collect()
}

pub struct VisionAnalyzer {
    chat: Arc<dyn ChatModel>,
    model: String,
    max_frames: usize,
}

impl VisionAnalyzer {
    pub fn new(chat: Arc<dyn ChatModel>, model: impl Into<String>, max_frames: usize) -> Self {
        Self {
            chat,
            model: model.into(),
            max_frames,
        }
    }

    /// Analyze the selected frames; results keep temporal order
    pub async fn analyze(&self, frames: &[OcrFrameResult]) -> Vec<FrameAnalysis> {
        let selected = select_evenly_spaced(frames, self.max_frames);

        tracing::info!(
            candidate_frames = frames.len(),
            selected_frames = selected.len(),
            model = %self.model,
            "Starting vision analysis"
        );

        let mut analyses = Vec::with_capacity(selected.len());
        for batch in selected.chunks(VISION_CONCURRENCY) {
            let results = join_all(batch.iter().map(|frame| self.analyze_frame(frame))).await;
            analyses.extend(results.into_iter().flatten());
        }

        tracing::info!(analyzed_frames = analyses.len(), "Vision analysis complete");
        analyses
    }

    async fn analyze_frame(&self, frame: &OcrFrameResult) -> Option<FrameAnalysis> {
        let image = match read_image(&frame.path).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(frame = %frame.frame, error = %e, "Could not read frame image, skipping");
                return None;
            }
        };

        let request = ChatRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: format!(
                "OCR text detected in this frame (may contain errors):\n{}",
                frame.text
            ),
            image: Some(image),
            temperature: 0.1,
            max_tokens: 1000,
        };

        match self.chat.complete(request).await {
            Ok(content) => Some(parse_frame_analysis(&content, frame.timestamp_seconds)),
            Err(e) => {
                tracing::warn!(frame = %frame.frame, error = %e, "Vision analysis failed for frame");
                None
            }
        }
    }
}

async fn read_image(path: &Path) -> std::io::Result<ChatImage> {
    let data = tokio::fs::read(path).await?;
    let mime_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    Ok(ChatImage {
        mime_type: mime_type.to_string(),
        data,
    })
}

/// Parse the model's answer; anything unparseable becomes an empty analysis
pub fn parse_frame_analysis(content: &str, timestamp_seconds: f64) -> FrameAnalysis {
    let raw: RawAnalysis = match serde_json::from_str(strip_code_fences(content)) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable vision response, using empty analysis");
            RawAnalysis::default()
        }
    };

    FrameAnalysis {
        timestamp_seconds,
        ingredients: texts(raw.ingredients),
        steps: texts(raw.steps),
        other_text: raw.other_text.and_then(text).unwrap_or_default(),
    }
}

fn texts(values: Vec<Value>) -> Vec<String> {
    values.into_iter().filter_map(text).collect()
}

fn text(value: Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s,
        Value::Null => return None,
        other => other.to_string(),
    };
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
