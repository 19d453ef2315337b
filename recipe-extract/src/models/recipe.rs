//! Extracted recipe structures
//!
//! Model output is deserialized leniently: numeric fields may arrive as
//! strings ("15 minutes") and quantities as numbers. Validity rules are
//! applied afterwards by [`ExtractedRecipe::normalize`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ExtractionJob;

fn default_confidence() -> f32 {
    0.5
}

/// One recipe synthesized from a video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecipe {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub prep_time_minutes: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub cook_time_minutes: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub servings: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub difficulty: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub components: Vec<RecipeComponent>,
    /// Model's self-reported confidence in [0, 1]
    #[serde(default = "default_confidence", deserialize_with = "lenient::confidence")]
    pub confidence: f32,
}

/// A named part of a recipe (e.g. "Dough", "Sauce")
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeComponent {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub notes: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    /// 1-based position; 0 means "not provided" and is backfilled
    #[serde(default, deserialize_with = "lenient::u32_or_zero")]
    pub order: u32,
    #[serde(default, deserialize_with = "lenient::string")]
    pub instruction: String,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub duration_minutes: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tip: Option<String>,
}

impl RecipeComponent {
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty() && self.steps.is_empty()
    }
}

impl ExtractedRecipe {
    /// Apply validity rules, returning `None` for an unusable recipe
    ///
    /// - blank ingredients and steps are dropped
    /// - components with neither ingredients nor steps are dropped
    /// - a recipe needs a title and at least one component
    /// - missing step orders are backfilled by position
    pub fn normalize(mut self) -> Option<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return None;
        }

        for component in &mut self.components {
            component.ingredients.retain(|i| !i.name.trim().is_empty());
            component.steps.retain(|s| !s.instruction.trim().is_empty());
            for (position, step) in component.steps.iter_mut().enumerate() {
                if step.order == 0 {
                    step.order = position as u32 + 1;
                }
            }
        }
        self.components.retain(|c| !c.is_empty());
        if self.components.is_empty() {
            return None;
        }

        self.confidence = self.confidence.clamp(0.0, 1.0);
        Some(self)
    }
}

/// Parse the stored extraction result
///
/// Older records stored a single recipe object rather than an array; both are accepted.
pub fn parse_stored_recipes(raw: &str) -> serde_json::Result<Vec<ExtractedRecipe>> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Null => Ok(Vec::new()),
        value @ serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        value => serde_json::from_value(value),
    }
}

/// Caller-supplied field overrides applied when importing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
    pub prep_time_minutes: Option<u32>,
    pub cook_time_minutes: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Recipe record created by an import
#[derive(Debug, Clone, Serialize)]
pub struct NewRecipe {
    pub recipe_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub prep_time_minutes: Option<u32>,
    pub cook_time_minutes: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub tags: Vec<String>,
    pub components: Vec<RecipeComponent>,
    pub source_type: String,
    pub source_url: String,
    pub source_video_id: String,
    pub source_channel: Option<String>,
    pub source_thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewRecipe {
    /// Build the record from an extracted recipe; overrides take precedence
    pub fn from_extraction(
        job: &ExtractionJob,
        recipe: &ExtractedRecipe,
        overrides: RecipeOverrides,
    ) -> Self {
        let metadata = job.video_metadata.as_ref();
        Self {
            recipe_id: Uuid::new_v4(),
            user_id: job.user_id.clone(),
            title: overrides
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| recipe.title.clone()),
            description: overrides.description.or_else(|| recipe.description.clone()),
            prep_time_minutes: overrides.prep_time_minutes.or(recipe.prep_time_minutes),
            cook_time_minutes: overrides.cook_time_minutes.or(recipe.cook_time_minutes),
            servings: overrides.servings.or(recipe.servings),
            difficulty: overrides.difficulty.or_else(|| recipe.difficulty.clone()),
            category: overrides.category.or_else(|| recipe.category.clone()),
            cuisine: overrides.cuisine.or_else(|| recipe.cuisine.clone()),
            tags: overrides.tags.unwrap_or_else(|| recipe.tags.clone()),
            components: recipe.components.clone(),
            source_type: "youtube".to_string(),
            source_url: job.source_url.clone(),
            source_video_id: job.video_id.clone(),
            source_channel: metadata.map(|m| m.channel.clone()),
            source_thumbnail_url: metadata.map(|m| m.thumbnail_url.clone()),
            created_at: Utc::now(),
        }
    }
}

/// Tolerant deserializers for model-produced JSON
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn value_to_string(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    fn value_to_u32(value: &Value) -> Option<u32> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                .and_then(|n| u32::try_from(n).ok()),
            // "15 minutes", "4 servings"
            Value::String(s) => {
                let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            }
            _ => None,
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(value_to_string(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(value_to_string(Value::deserialize(d)?))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(value_to_u32(&Value::deserialize(d)?))
    }

    pub fn u32_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(value_to_u32(&Value::deserialize(d)?).unwrap_or(0))
    }

    pub fn confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
        let value = Value::deserialize(d)?;
        let parsed = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(parsed.map(|f| f as f32).unwrap_or(super::default_confidence()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_numbers_and_quantities() {
        let recipe: ExtractedRecipe = serde_json::from_value(json!({
            "title": "Pancakes",
            "prep_time_minutes": "10 minutes",
            "servings": 4.0,
            "components": [{
                "name": "Batter",
                "ingredients": [{"quantity": 2, "unit": "cups", "name": "flour"}],
                "steps": [{"instruction": "Whisk"}]
            }],
            "confidence": "0.8"
        }))
        .unwrap();

        assert_eq!(recipe.prep_time_minutes, Some(10));
        assert_eq!(recipe.servings, Some(4));
        assert_eq!(recipe.components[0].ingredients[0].quantity.as_deref(), Some("2"));
        assert!((recipe.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalize_backfills_step_order() {
        let recipe: ExtractedRecipe = serde_json::from_value(json!({
            "title": "Soup",
            "components": [{
                "name": "Soup",
                "ingredients": [],
                "steps": [
                    {"instruction": "Chop"},
                    {"order": 7, "instruction": "Simmer"},
                    {"instruction": "Serve"}
                ]
            }]
        }))
        .unwrap();

        let recipe = recipe.normalize().unwrap();
        let orders: Vec<u32> = recipe.components[0].steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 7, 3]);
    }

    #[test]
    fn test_normalize_rejects_recipe_without_components() {
        let recipe = ExtractedRecipe {
            title: "Empty".to_string(),
            components: vec![RecipeComponent {
                name: "Nothing".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(recipe.normalize().is_none());
    }

    #[test]
    fn test_normalize_rejects_untitled_recipe() {
        let recipe = ExtractedRecipe {
            title: "   ".to_string(),
            components: vec![RecipeComponent {
                name: "Main".to_string(),
                steps: vec![RecipeStep {
                    order: 1,
                    instruction: "Cook".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(recipe.normalize().is_none());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let recipe = ExtractedRecipe {
            title: "Toast".to_string(),
            confidence: 3.5,
            components: vec![RecipeComponent {
                name: "Toast".to_string(),
                ingredients: vec![RecipeIngredient {
                    name: "bread".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(recipe.normalize().unwrap().confidence, 1.0);
    }

    #[test]
    fn test_stored_legacy_object_becomes_single_element() {
        let legacy = r#"{"title": "Old format", "components": []}"#;
        let recipes = parse_stored_recipes(legacy).unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].title, "Old format");

        let current = r#"[{"title": "A"}, {"title": "B"}]"#;
        assert_eq!(parse_stored_recipes(current).unwrap().len(), 2);
        assert!(parse_stored_recipes("null").unwrap().is_empty());
    }
}
