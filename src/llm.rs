use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response missing content")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub media_type: &'static str,
    pub data_base64: String,
}

impl ImagePayload {
    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<ImagePayload>,
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            max_tokens: None,
        }
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A language model reachable by prompt (plus optional image) that answers with free text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    model: String,
    vision_model: Option<String>,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| ModelError::Unavailable(err.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            base_url: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn payload(&self, request: &ModelRequest) -> Value {
        let (model, content) = match &request.image {
            Some(image) => (
                self.vision_model.as_deref().unwrap_or(&self.model),
                json!([
                    { "type": "image_url", "image_url": { "url": image.data_url() } },
                    { "type": "text", "text": request.prompt },
                ]),
            ),
            None => (self.model.as_str(), json!(request.prompt)),
        };

        json!({
            "model": model,
            "temperature": self.temperature,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content },
            ],
        })
    }
}

const SYSTEM_PROMPT: &str =
    "You extract event listings for a Rochester, NY nightlife aggregator. Use only the information provided. \
     When asked for JSON, answer with a single JSON object and nothing else.";

#[async_trait]
impl ModelClient for ChatCompletionsClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{}/chat/completions", base);

        let mut http = self.client.post(url).json(&self.payload(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|err| ModelError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ModelError::Unavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_content(&body)
    }
}

fn parse_content(body: &str) -> Result<String, ModelError> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| ModelError::Unavailable(err.to_string()))?;

    value
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ModelError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChatCompletionsClient {
        let config = LlmConfig {
            vision_model: Some("llava".to_string()),
            ..LlmConfig::default()
        };
        ChatCompletionsClient::from_config(&config).unwrap()
    }

    #[test]
    fn text_requests_use_the_text_model() {
        let payload = client().payload(&ModelRequest::text("hello").with_max_tokens(100));
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["max_tokens"], 100);
        assert_eq!(payload["messages"][1]["content"], "hello");
    }

    #[test]
    fn image_requests_embed_a_data_url() {
        let request = ModelRequest::text("what is on this flyer?").with_image(ImagePayload {
            media_type: "image/jpeg",
            data_base64: "AAAA".to_string(),
        });
        let payload = client().payload(&request);
        assert_eq!(payload["model"], "llava");
        let parts = payload["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts[0]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
        assert_eq!(parts[1]["text"], "what is on this flyer?");
    }

    #[test]
    fn reads_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  {\"title\":\"x\"} "}}]}"#;
        assert_eq!(parse_content(body).unwrap(), r#"{"title":"x"}"#);
    }

    #[test]
    fn empty_or_foreign_bodies_are_errors() {
        assert!(matches!(
            parse_content(r#"{"choices":[{"message":{"content":"   "}}]}"#),
            Err(ModelError::EmptyResponse)
        ));
        assert!(matches!(parse_content(r#"{"error":"nope"}"#), Err(ModelError::EmptyResponse)));
        assert!(matches!(parse_content("<html>"), Err(ModelError::Unavailable(_))));
    }
}
