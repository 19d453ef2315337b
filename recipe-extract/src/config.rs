//! Configuration resolution for recipe-extract
//!
//! Every setting resolves with ENV → TOML → compiled default priority.
//! The TOML file is `recipe-extract.toml` in the root folder.

use recipe_common::{Error, Result};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_MAX_VIDEO_DURATION_SECONDS: u64 = 3600;
pub const DEFAULT_MAX_VISION_FRAMES: usize = 20;
pub const DEFAULT_OCR_BATCH_SIZE: usize = 5;
pub const DEFAULT_SCENE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_MAX_VIDEO_HEIGHT: u32 = 720;
pub const DEFAULT_INFERENCE_BASE_URL: &str = "https://api.openai.com/v1";

/// Raw `recipe-extract.toml` contents (all keys optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlSettings {
    #[serde(default)]
    pub logging: recipe_common::config::LoggingConfig,
    pub max_video_duration_seconds: Option<u64>,
    pub max_vision_frames: Option<usize>,
    pub ytdlp_path: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub tesseract_path: Option<String>,
    pub ocr_languages: Option<String>,
    pub ocr_batch_size: Option<usize>,
    pub scene_threshold: Option<f32>,
    pub max_video_height: Option<u32>,
    pub inference_api_key: Option<String>,
    pub inference_base_url: Option<String>,
    pub transcription_model: Option<String>,
    pub vision_model: Option<String>,
    pub synthesis_model: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Submissions longer than this are rejected before a job is created
    pub max_video_duration_seconds: u64,
    /// Upper bound on frames sent to the vision model
    pub max_vision_frames: usize,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub tesseract_path: String,
    /// Tesseract language set, e.g. "eng+spa"
    pub ocr_languages: String,
    /// Frames OCR'd concurrently per batch
    pub ocr_batch_size: usize,
    /// ffmpeg scene-change sensitivity (0.0-1.0)
    pub scene_threshold: f32,
    pub max_video_height: u32,
    pub inference_api_key: Option<String>,
    pub inference_base_url: String,
    pub transcription_model: String,
    pub vision_model: String,
    pub synthesis_model: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_video_duration_seconds: DEFAULT_MAX_VIDEO_DURATION_SECONDS,
            max_vision_frames: DEFAULT_MAX_VISION_FRAMES,
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            tesseract_path: "tesseract".to_string(),
            ocr_languages: "eng+spa".to_string(),
            ocr_batch_size: DEFAULT_OCR_BATCH_SIZE,
            scene_threshold: DEFAULT_SCENE_THRESHOLD,
            max_video_height: DEFAULT_MAX_VIDEO_HEIGHT,
            inference_api_key: None,
            inference_base_url: DEFAULT_INFERENCE_BASE_URL.to_string(),
            transcription_model: "whisper-1".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            synthesis_model: "gpt-4o".to_string(),
        }
    }
}

impl ExtractConfig {
    /// Resolve from the process environment and TOML settings
    pub fn resolve(toml: &TomlSettings) -> Result<Self> {
        Self::resolve_with(toml, |key| std::env::var(key).ok())
    }

    /// Resolve using an arbitrary environment lookup
    pub fn resolve_with<F>(toml: &TomlSettings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let resolver = Resolver { env: &env };

        let config = Self {
            max_video_duration_seconds: resolver.parsed(
                "RECIPE_MAX_VIDEO_DURATION_SECONDS",
                toml.max_video_duration_seconds,
                defaults.max_video_duration_seconds,
            )?,
            max_vision_frames: resolver.parsed(
                "RECIPE_MAX_VISION_FRAMES",
                toml.max_vision_frames,
                defaults.max_vision_frames,
            )?,
            ytdlp_path: resolver.text("RECIPE_YTDLP_PATH", toml.ytdlp_path.clone(), defaults.ytdlp_path),
            ffmpeg_path: resolver.text("RECIPE_FFMPEG_PATH", toml.ffmpeg_path.clone(), defaults.ffmpeg_path),
            tesseract_path: resolver.text(
                "RECIPE_TESSERACT_PATH",
                toml.tesseract_path.clone(),
                defaults.tesseract_path,
            ),
            ocr_languages: resolver.text(
                "RECIPE_OCR_LANGUAGES",
                toml.ocr_languages.clone(),
                defaults.ocr_languages,
            ),
            ocr_batch_size: resolver.parsed(
                "RECIPE_OCR_BATCH_SIZE",
                toml.ocr_batch_size,
                defaults.ocr_batch_size,
            )?,
            scene_threshold: resolver.parsed(
                "RECIPE_SCENE_THRESHOLD",
                toml.scene_threshold,
                defaults.scene_threshold,
            )?,
            max_video_height: resolver.parsed(
                "RECIPE_MAX_VIDEO_HEIGHT",
                toml.max_video_height,
                defaults.max_video_height,
            )?,
            inference_api_key: resolver.secret("OPENAI_API_KEY", toml.inference_api_key.clone()),
            inference_base_url: resolver.text(
                "RECIPE_INFERENCE_BASE_URL",
                toml.inference_base_url.clone(),
                defaults.inference_base_url,
            ),
            transcription_model: resolver.text(
                "RECIPE_TRANSCRIPTION_MODEL",
                toml.transcription_model.clone(),
                defaults.transcription_model,
            ),
            vision_model: resolver.text("RECIPE_VISION_MODEL", toml.vision_model.clone(), defaults.vision_model),
            synthesis_model: resolver.text(
                "RECIPE_SYNTHESIS_MODEL",
                toml.synthesis_model.clone(),
                defaults.synthesis_model,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_video_duration_seconds == 0 {
            return Err(Error::Config("max_video_duration_seconds must be positive".to_string()));
        }
        if self.max_vision_frames == 0 {
            return Err(Error::Config("max_vision_frames must be positive".to_string()));
        }
        if self.ocr_batch_size == 0 {
            return Err(Error::Config("ocr_batch_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.scene_threshold) {
            return Err(Error::Config(format!(
                "scene_threshold must be within 0.0-1.0, got {}",
                self.scene_threshold
            )));
        }
        Ok(())
    }
}

/// Validate a configured value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

struct Resolver<'a, F: Fn(&str) -> Option<String>> {
    env: &'a F,
}

impl<'a, F: Fn(&str) -> Option<String>> Resolver<'a, F> {
    fn env_value(&self, key: &str) -> Option<String> {
        (self.env)(key).filter(|v| is_valid_value(v))
    }

    fn warn_if_shadowed(&self, key: &str, toml_present: bool) {
        if toml_present {
            warn!("{} set in both environment and TOML config; using environment", key);
        }
    }

    fn text(&self, key: &str, toml: Option<String>, default: String) -> String {
        let toml = toml.filter(|v| is_valid_value(v));
        if let Some(value) = self.env_value(key) {
            self.warn_if_shadowed(key, toml.is_some());
            return value;
        }
        toml.unwrap_or(default)
    }

    fn parsed<T>(&self, key: &str, toml: Option<T>, default: T) -> Result<T>
    where
        T: FromStr,
    {
        if let Some(raw) = self.env_value(key) {
            self.warn_if_shadowed(key, toml.is_some());
            return raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} has invalid value: {}", key, raw)));
        }
        Ok(toml.unwrap_or(default))
    }

    fn secret(&self, key: &str, toml: Option<String>) -> Option<String> {
        let toml = toml.filter(|v| is_valid_value(v));
        if let Some(value) = self.env_value(key) {
            self.warn_if_shadowed(key, toml.is_some());
            info!("Inference API key loaded from environment variable");
            return Some(value);
        }
        if toml.is_some() {
            info!("Inference API key loaded from TOML config");
        }
        toml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config = ExtractConfig::resolve_with(&TomlSettings::default(), env_from(&[])).unwrap();
        assert_eq!(config.max_video_duration_seconds, 3600);
        assert_eq!(config.max_vision_frames, 20);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(config.inference_api_key.is_none());
    }

    #[test]
    fn test_env_beats_toml_beats_default() {
        let toml = TomlSettings {
            max_video_duration_seconds: Some(1800),
            max_vision_frames: Some(10),
            ffmpeg_path: Some("/opt/ffmpeg".to_string()),
            ..Default::default()
        };
        let config = ExtractConfig::resolve_with(
            &toml,
            env_from(&[("RECIPE_MAX_VIDEO_DURATION_SECONDS", "600")]),
        )
        .unwrap();

        assert_eq!(config.max_video_duration_seconds, 600);
        assert_eq!(config.max_vision_frames, 10);
        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg");
        assert_eq!(config.tesseract_path, "tesseract");
    }

    #[test]
    fn test_blank_env_value_is_ignored() {
        let toml = TomlSettings {
            inference_api_key: Some("toml-key".to_string()),
            ..Default::default()
        };
        let config = ExtractConfig::resolve_with(&toml, env_from(&[("OPENAI_API_KEY", "  ")])).unwrap();
        assert_eq!(config.inference_api_key.as_deref(), Some("toml-key"));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let result = ExtractConfig::resolve_with(
            &TomlSettings::default(),
            env_from(&[("RECIPE_MAX_VISION_FRAMES", "many")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let toml = TomlSettings {
            scene_threshold: Some(4.0),
            ..Default::default()
        };
        assert!(ExtractConfig::resolve_with(&toml, env_from(&[])).is_err());
    }

    #[test]
    fn test_toml_settings_parse() {
        let toml: TomlSettings = toml::from_str(
            r#"
            max_video_duration_seconds = 900
            ocr_languages = "eng+fra"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(toml.max_video_duration_seconds, Some(900));
        assert_eq!(toml.logging.level.as_deref(), Some("debug"));
    }
}
