//! OCR pre-filter
//!
//! Cheap text detection that discards frames without recipe-like text
//! before the expensive vision stage.

use futures::future::join_all;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{OcrFrameResult, SampledFrame};
use crate::types::OcrEngine;

/// Minimum tokens longer than two characters
const MIN_MEANINGFUL_TOKENS: usize = 3;
/// Without a keyword, this many tokens plus a digit also qualifies
const MIN_TOKENS_WITH_DIGIT: usize = 5;

/// Recipe vocabulary in English and Spanish: units, techniques, staples
static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // units
        "cup", "tbsp", "tsp", "tablespoon", "teaspoon", "gram", "kg", "ml", "liter", "litre",
        "oz", "ounce", "lb", "pound", "pinch", "clove", "slice",
        "taza", "cucharada", "cucharadita", "gramo", "litro", "pizca", "diente", "rebanada",
        // techniques
        "mix", "bake", "boil", "chop", "stir", "add", "cook", "fry", "whisk", "knead",
        "simmer", "preheat", "blend", "season", "grill", "roast", "dice", "mince",
        "mezclar", "hornear", "hervir", "picar", "batir", "agregar", "añadir", "cocinar",
        "freír", "cortar", "amasar", "precalentar", "sazonar",
        // staples
        "flour", "sugar", "salt", "butter", "egg", "milk", "oil", "pepper", "garlic",
        "onion", "water", "cheese", "cream", "tomato",
        "harina", "azúcar", "sal", "mantequilla", "huevo", "leche", "aceite", "pimienta",
        "ajo", "cebolla", "agua", "queso", "crema", "tomate",
        // structure
        "ingredient", "recipe", "serving", "minute", "oven",
        "ingrediente", "receta", "porcion", "porción", "minuto", "horno",
    ]
    .into_iter()
    .collect()
});

/// Whether OCR text looks like recipe content
///
/// Requires at least three tokens longer than two characters, and either
/// a recipe keyword or five such tokens with at least one digit.
pub fn is_recipe_relevant(text: &str) -> bool {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect();

    let meaningful = tokens.iter().filter(|t| t.chars().count() > 2).count();
    if meaningful < MIN_MEANINGFUL_TOKENS {
        return false;
    }

    let has_keyword = tokens.iter().any(|token| is_keyword(token));
    let has_digit = text.chars().any(|c| c.is_ascii_digit());

    has_keyword || (meaningful >= MIN_TOKENS_WITH_DIGIT && has_digit)
}

/// Match a token or its plural ("cups", "tomatoes")
fn is_keyword(token: &str) -> bool {
    let word: String = token.chars().filter(|c| c.is_alphabetic()).collect();
    if word.is_empty() {
        return false;
    }
    if KEYWORDS.contains(word.as_str()) {
        return true;
    }
    word.strip_suffix("es")
        .filter(|stem| KEYWORDS.contains(stem))
        .or_else(|| word.strip_suffix('s').filter(|stem| KEYWORDS.contains(stem)))
        .is_some()
}

pub struct TextPrefilter {
    ocr: Arc<dyn OcrEngine>,
    batch_size: usize,
}

impl TextPrefilter {
    pub fn new(ocr: Arc<dyn OcrEngine>, batch_size: usize) -> Self {
        Self {
            ocr,
            batch_size: batch_size.max(1),
        }
    }

    /// OCR every frame and keep the relevant ones, in input order
    ///
    /// Frames are recognized concurrently within a batch, batches run one
    /// after another. A failed OCR call only drops that frame.
    pub async fn filter(&self, frames: &[SampledFrame]) -> Vec<OcrFrameResult> {
        let mut relevant = Vec::new();

        for batch in frames.chunks(self.batch_size) {
            let results = join_all(batch.iter().map(|frame| self.recognize(frame))).await;
            relevant.extend(results.into_iter().flatten());
        }

        tracing::info!(
            total_frames = frames.len(),
            relevant_frames = relevant.len(),
            "OCR pre-filter complete"
        );

        relevant
    }

    async fn recognize(&self, frame: &SampledFrame) -> Option<OcrFrameResult> {
        let text = match self.ocr.recognize(&frame.path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    frame = %frame.path.display(),
                    error = %e,
                    "OCR failed for frame, skipping"
                );
                return None;
            }
        };

        if !is_recipe_relevant(&text) {
            return None;
        }

        Some(OcrFrameResult {
            frame: frame
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            timestamp_seconds: frame.timestamp_seconds,
            text,
            path: frame.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapabilityError;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_keyword_with_digits_is_relevant() {
        assert!(is_recipe_relevant("mix 2 cups flour and 1 tsp salt"));
    }

    #[test]
    fn test_short_text_is_not_relevant() {
        assert!(!is_recipe_relevant("hello world"));
        assert!(!is_recipe_relevant("add salt"));
    }

    #[test]
    fn test_spanish_keywords() {
        assert!(is_recipe_relevant("Agregar la harina poco a poco"));
        assert!(is_recipe_relevant("INGREDIENTES: tomates, cebollas"));
    }

    #[test]
    fn test_digits_without_keyword_need_five_tokens() {
        assert!(is_recipe_relevant("Step 3: place them into the large pan"));
        assert!(!is_recipe_relevant("Episode 12 coming soon"));
    }

    #[test]
    fn test_plain_prose_without_keyword_or_digit() {
        assert!(!is_recipe_relevant("thanks for watching please subscribe"));
    }

    struct ScriptedOcr;

    #[async_trait::async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(&self, image: &Path) -> Result<String, CapabilityError> {
            let name = image.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match name {
                "frame_0001.jpg" => Ok("2 cups flour and 1 tsp salt".to_string()),
                "frame_0002.jpg" => Ok("subscribe".to_string()),
                "frame_0003.jpg" => Err(CapabilityError::ToolFailed {
                    tool: "tesseract".into(),
                    stderr: "corrupt image".into(),
                }),
                _ => Ok("whisk the eggs with sugar".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_filter_keeps_relevant_frames_in_order() {
        let frames: Vec<SampledFrame> = (1..=7)
            .map(|i| SampledFrame {
                path: PathBuf::from(format!("/tmp/job/frames/frame_{:04}.jpg", i)),
                index: i - 1,
                timestamp_seconds: (i - 1) as f64 * 10.0,
            })
            .collect();

        let prefilter = TextPrefilter::new(Arc::new(ScriptedOcr), 3);
        let kept = prefilter.filter(&frames).await;

        let names: Vec<&str> = kept.iter().map(|r| r.frame.as_str()).collect();
        assert_eq!(
            names,
            vec!["frame_0001.jpg", "frame_0004.jpg", "frame_0005.jpg", "frame_0006.jpg", "frame_0007.jpg"]
        );
        assert_eq!(kept[0].timestamp_seconds, 0.0);
    }
}
