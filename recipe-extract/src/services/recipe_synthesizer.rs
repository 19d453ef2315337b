//! Recipe synthesis
//!
//! Fuses the video description, per-frame visual fragments and the spoken
//! transcript into one or more structured recipes with a single
//! text-generation call.

use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{ExtractedRecipe, FrameAnalysis, VideoMetadata};
use crate::types::{CapabilityError, ChatModel, ChatRequest};
use crate::utils::strip_code_fences;

/// Transcript characters sent to the model
const MAX_TRANSCRIPT_CHARS: usize = 30_000;
const MAX_DESCRIPTION_CHARS: usize = 5_000;

const SYSTEM_PROMPT: &str = r#"You are a culinary assistant that turns cooking videos into structured recipes.

You receive three sources. Apply them in this priority order:
1. VIDEO DESCRIPTION: check it first. It often contains the complete recipe with exact measurements; when it does, its quantities win.
2. VISUAL DATA (text read from video frames): use it for ingredients and quantities the description lacks.
3. TRANSCRIPT: use it to fill gaps in the instructions, technique details, times and tips.

Detect MULTIPLE DISTINCT RECIPES. A video presenting several dishes ("3 pasta recipes") yields one recipe per dish. A single dish with parts (a dish and its sauce, a cake and its frosting) is ONE recipe with multiple components.

Always respond with a JSON array of recipes, even when there is only one, and nothing else:
[
  {
    "title": "string",
    "description": "string",
    "prep_time_minutes": number or null,
    "cook_time_minutes": number or null,
    "servings": number or null,
    "difficulty": "easy" | "medium" | "hard",
    "category": "string",
    "cuisine": "string",
    "tags": ["string"],
    "components": [
      {
        "name": "string",
        "ingredients": [{"quantity": "string", "unit": "string", "name": "string", "notes": "string", "optional": false}],
        "steps": [{"order": 1, "instruction": "string", "duration_minutes": number or null, "tip": "string"}]
      }
    ],
    "confidence": number between 0 and 1
  }
]
Every component must have at least one ingredient or step. Do not invent ingredients that no source mentions."#;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("No valid recipes could be extracted from this video")]
    NoValidRecipes,

    #[error("Recipe synthesis returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

pub struct RecipeSynthesizer {
    chat: Arc<dyn ChatModel>,
    model: String,
}

impl RecipeSynthesizer {
    pub fn new(chat: Arc<dyn ChatModel>, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
        }
    }

    /// Produce at least one valid recipe, or fail
    pub async fn synthesize(
        &self,
        transcript: &str,
        analyses: &[FrameAnalysis],
        metadata: &VideoMetadata,
    ) -> Result<Vec<ExtractedRecipe>, SynthesisError> {
        let request = ChatRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: build_user_prompt(transcript, analyses, metadata),
            image: None,
            temperature: 0.3,
            max_tokens: 8000,
        };

        let content = self.chat.complete(request).await?;
        let recipes = parse_recipes(&content)?;

        tracing::info!(
            recipe_count = recipes.len(),
            titles = ?recipes.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            "Recipe synthesis complete"
        );

        Ok(recipes)
    }
}

fn build_user_prompt(transcript: &str, analyses: &[FrameAnalysis], metadata: &VideoMetadata) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "VIDEO TITLE: {}", metadata.title);
    let _ = writeln!(prompt, "CHANNEL: {}", metadata.channel);
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "VIDEO DESCRIPTION:");
    match metadata.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(description) => {
            let _ = writeln!(prompt, "{}", truncate_chars(description, MAX_DESCRIPTION_CHARS));
        }
        None => {
            let _ = writeln!(prompt, "(none)");
        }
    }
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "VISUAL DATA FROM VIDEO FRAMES:");
    let mut any_visual = false;
    for analysis in analyses.iter().filter(|a| !a.is_empty()) {
        any_visual = true;
        let _ = writeln!(prompt, "[{}]", format_timestamp(analysis.timestamp_seconds));
        if !analysis.ingredients.is_empty() {
            let _ = writeln!(prompt, "  Ingredients: {}", analysis.ingredients.join("; "));
        }
        if !analysis.steps.is_empty() {
            let _ = writeln!(prompt, "  Steps: {}", analysis.steps.join("; "));
        }
        if !analysis.other_text.trim().is_empty() {
            let _ = writeln!(prompt, "  Other: {}", analysis.other_text.trim());
        }
    }
    if !any_visual {
        let _ = writeln!(prompt, "(none)");
    }
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "TRANSCRIPT:");
    let transcript = transcript.trim();
    if transcript.is_empty() {
        let _ = writeln!(prompt, "(none)");
    } else {
        let _ = writeln!(prompt, "{}", truncate_chars(transcript, MAX_TRANSCRIPT_CHARS));
    }

    prompt
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Parse and validate the synthesis response
///
/// Accepts a fenced or bare JSON array (a bare object counts as one
/// recipe). Invalid entries are dropped; an empty result is an error.
pub fn parse_recipes(content: &str) -> Result<Vec<ExtractedRecipe>, SynthesisError> {
    let value = parse_json_payload(content)?;

    let candidates = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(SynthesisError::InvalidResponse(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };
    let candidate_count = candidates.len();

    let recipes: Vec<ExtractedRecipe> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            match serde_json::from_value::<ExtractedRecipe>(candidate) {
                Ok(recipe) => recipe.normalize(),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Discarding malformed recipe");
                    None
                }
            }
        })
        .collect();

    if recipes.len() < candidate_count {
        tracing::warn!(
            candidates = candidate_count,
            valid = recipes.len(),
            "Discarded recipes without a title or usable components"
        );
    }

    if recipes.is_empty() {
        return Err(SynthesisError::NoValidRecipes);
    }

    Ok(recipes)
}

/// JSON from the response, tolerating prose around the array
fn parse_json_payload(content: &str) -> Result<Value, SynthesisError> {
    let stripped = strip_code_fences(content);
    match serde_json::from_str(stripped) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let start = stripped.find(['[', '{']);
            let end = stripped.rfind([']', '}']);
            match (start, end) {
                (Some(start), Some(end)) if end > start => serde_json::from_str(&stripped[start..=end])
                    .map_err(|e| SynthesisError::InvalidResponse(e.to_string())),
                _ => Err(SynthesisError::InvalidResponse(first_error.to_string())),
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recipe_json(title: &str, with_components: bool) -> Value {
        let components = if with_components {
            json!([{
                "name": "Main",
                "ingredients": [{"quantity": "200", "unit": "g", "name": "spaghetti"}],
                "steps": [{"instruction": "Boil the pasta"}, {"instruction": "Drain"}]
            }])
        } else {
            json!([])
        };
        json!({"title": title, "components": components, "confidence": 0.9})
    }

    #[test]
    fn test_three_valid_recipes() {
        let content = json!([
            recipe_json("Carbonara", true),
            recipe_json("Amatriciana", true),
            recipe_json("Cacio e Pepe", true)
        ])
        .to_string();

        let recipes = parse_recipes(&content).unwrap();
        assert_eq!(recipes.len(), 3);
        assert_eq!(recipes[2].title, "Cacio e Pepe");
        assert_eq!(recipes[0].components[0].steps[1].order, 2);
    }

    #[test]
    fn test_recipe_with_empty_components_is_filtered() {
        let content = json!([
            recipe_json("Carbonara", true),
            recipe_json("Placeholder", false),
            recipe_json("Cacio e Pepe", true)
        ])
        .to_string();

        let recipes = parse_recipes(&content).unwrap();
        let titles: Vec<&str> = recipes.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Carbonara", "Cacio e Pepe"]);
    }

    #[test]
    fn test_bare_object_becomes_single_recipe() {
        let content = format!("```json\n{}\n```", recipe_json("Soup", true));
        assert_eq!(parse_recipes(&content).unwrap().len(), 1);
    }

    #[test]
    fn test_prose_around_array() {
        let content = format!("Here are the recipes:\n{}\nEnjoy!", json!([recipe_json("Soup", true)]));
        assert_eq!(parse_recipes(&content).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_valid_recipes_is_error() {
        let content = json!([recipe_json("Nothing", false)]).to_string();
        assert!(matches!(parse_recipes(&content), Err(SynthesisError::NoValidRecipes)));
        assert!(matches!(parse_recipes("[]"), Err(SynthesisError::NoValidRecipes)));
        assert_eq!(
            SynthesisError::NoValidRecipes.to_string(),
            "No valid recipes could be extracted from this video"
        );
    }

    #[test]
    fn test_non_json_is_invalid_response() {
        assert!(matches!(
            parse_recipes("Sorry, I can't help with that."),
            Err(SynthesisError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_prompt_orders_sources_and_skips_empty_frames() {
        let metadata = VideoMetadata {
            title: "Pasta night".to_string(),
            duration_seconds: 600,
            channel: "Chef".to_string(),
            thumbnail_url: String::new(),
            description: Some("200g spaghetti".to_string()),
        };
        let analyses = vec![
            FrameAnalysis {
                timestamp_seconds: 75.0,
                ingredients: vec!["2 eggs".to_string()],
                ..Default::default()
            },
            FrameAnalysis::default(),
        ];

        let prompt = build_user_prompt("boil the water", &analyses, &metadata);
        let description_at = prompt.find("VIDEO DESCRIPTION").unwrap();
        let visual_at = prompt.find("VISUAL DATA").unwrap();
        let transcript_at = prompt.find("TRANSCRIPT").unwrap();
        assert!(description_at < visual_at && visual_at < transcript_at);
        assert!(prompt.contains("[1:15]\n  Ingredients: 2 eggs"));
        assert_eq!(prompt.matches('[').count(), 1);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("añadir", 2), "añ");
        assert_eq!(truncate_chars("sal", 10), "sal");
    }
}
