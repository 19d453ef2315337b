//! OpenAI-compatible inference client
//!
//! Implements both [`SpeechToText`] (`/audio/transcriptions`) and
//! [`ChatModel`] (`/chat/completions`, with an optional base64 data-URL image).

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

use crate::types::{CapabilityError, ChatModel, ChatRequest, SpeechToText};

const USER_AGENT: &str = concat!("recipe-extract/", env!("CARGO_PKG_VERSION"));

/// Transcription uploads and long syntheses can be slow
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct InferenceClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    transcription_model: String,
}

impl InferenceClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        transcription_model: impl Into<String>,
    ) -> Result<Self, CapabilityError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| CapabilityError::Network(e.to_string()))?;

        if api_key.is_none() {
            tracing::warn!("No inference API key configured; AI stages will fail");
        }

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            transcription_model: transcription_model.into(),
        })
    }

    fn api_key(&self) -> Result<&str, CapabilityError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CapabilityError::NotConfigured("inference API key (OPENAI_API_KEY)".to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait::async_trait]
impl SpeechToText for InferenceClient {
    async fn transcribe(&self, audio: &Path) -> Result<String, CapabilityError> {
        let api_key = self.api_key()?;
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        tracing::debug!(bytes = bytes.len(), model = %self.transcription_model, "Uploading audio for transcription");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| CapabilityError::Parse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone())
            .text("response_format", "text");

        let response = self
            .http_client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_request_error)?;

        let body = read_success_body(response).await?;
        Ok(body.trim().to_string())
    }
}

#[async_trait::async_trait]
impl ChatModel for InferenceClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, CapabilityError> {
        let api_key = self.api_key()?;
        let body = chat_body(&request);

        let response = self
            .http_client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        let raw = read_success_body(response).await?;
        parse_chat_content(&raw)
    }
}

/// Request body; user content becomes a text+image array when an image is attached
fn chat_body(request: &ChatRequest) -> Value {
    let user_content = match &request.image {
        Some(image) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
            json!([
                { "type": "text", "text": request.user },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:{};base64,{}", image.mime_type, encoded) }
                }
            ])
        }
        None => Value::String(request.user.clone()),
    };

    json!({
        "model": request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": user_content }
        ]
    })
}

fn parse_chat_content(raw: &str) -> Result<String, CapabilityError> {
    let completion: ChatCompletion = serde_json::from_str(raw)
        .map_err(|e| CapabilityError::Parse(format!("chat completion: {}", e)))?;

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CapabilityError::Parse("chat completion has no content".to_string()))
}

async fn read_success_body(response: reqwest::Response) -> Result<String, CapabilityError> {
    let status = response.status();
    let body = response.text().await.map_err(map_request_error)?;

    if !status.is_success() {
        return Err(CapabilityError::Api {
            status: status.as_u16(),
            message: api_error_message(&body),
        });
    }

    Ok(body)
}

/// `{"error": {"message": ...}}` when present, raw body otherwise
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

/// Connection and timeout failures are transient; the rest are not
fn map_request_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() {
        CapabilityError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        CapabilityError::Network(err.to_string())
    } else {
        CapabilityError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatImage;

    fn request(image: Option<ChatImage>) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            system: "sys".to_string(),
            user: "hint".to_string(),
            image,
            temperature: 0.1,
            max_tokens: 100,
        }
    }

    #[test]
    fn test_text_only_body() {
        let body = chat_body(&request(None));
        assert_eq!(body["messages"][1]["content"], "hint");
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_image_body_uses_data_url() {
        let body = chat_body(&request(Some(ChatImage {
            mime_type: "image/jpeg".to_string(),
            data: vec![1, 2, 3],
        })));
        let url = body["messages"][1]["content"][1]["image_url"]["url"].as_str().unwrap();
        assert_eq!(url, "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn test_parse_chat_content() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}]}"#;
        assert_eq!(parse_chat_content(raw).unwrap(), "[]");
        assert!(parse_chat_content(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn test_api_error_message_extraction() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#;
        assert_eq!(api_error_message(body), "Invalid API key");
        assert_eq!(api_error_message("gateway down"), "gateway down");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let client = InferenceClient::new("http://localhost:1", None, "whisper-1").unwrap();
        let result = client.complete(request(None)).await;
        assert!(matches!(result, Err(CapabilityError::NotConfigured(_))));
    }
}
