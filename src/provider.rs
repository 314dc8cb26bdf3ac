//! Remote vision-inference providers.
//!
//! Every provider implements [`VisionProvider`], so adding a provider to the
//! cascade means adding an entry to its list rather than a new code path.
//! The shipped implementation speaks the OpenAI-compatible chat-completions
//! protocol used by Groq and most hosted vision models.

use crate::config::CascadeConfig;
use crate::error::ConfigError;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Provider body text is truncated to this many characters in logs
const LOGGED_BODY_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("rate limited")]
    RateLimited,

    #[error("HTTP {status}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    /// 2xx reply whose envelope carried no usable message content
    #[error("malformed response envelope: {0}")]
    Envelope(String),
}

/// One multimodal request, shared by every provider in a cascade run.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    /// `data:<mime>;base64,<payload>`
    pub image_data_uri: String,
}

impl VisionRequest {
    pub fn new(prompt: String, image: &[u8]) -> Self {
        Self {
            prompt,
            image_data_uri: image_data_uri(image),
        }
    }
}

/// Encode an image for transport, sniffing the MIME type from its magic bytes.
pub fn image_data_uri(image: &[u8]) -> String {
    let mime = image::guess_format(image)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg");
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    format!("data:{};base64,{}", mime, encoded)
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Identifier used in logs, metrics and error details
    fn id(&self) -> &str;

    /// Issue one call and return the raw message content on a 2xx reply.
    async fn complete(&self, request: &VisionRequest) -> Result<String, ProviderError>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl<'a> {
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// OpenAI-compatible provider
// ============================================================================

/// Chat-completions client bound to a single model id.
pub struct OpenAiVisionProvider {
    model: String,
    endpoint: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiVisionProvider {
    pub fn new(
        model: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            temperature: 0.3,
            max_tokens: 1024,
            client,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// One provider per configured model, all sharing a pooled HTTP client.
    /// Without an API key there is no remote tier and the list is empty.
    pub fn from_config(config: &CascadeConfig) -> Result<Vec<Arc<dyn VisionProvider>>, ConfigError> {
        let Some(api_key) = config.api_key.as_deref() else {
            return Ok(Vec::new());
        };

        let client = reqwest::Client::builder()
            .timeout(config.attempt_timeout)
            .build()?;

        Ok(config
            .models
            .iter()
            .map(|model| {
                Arc::new(
                    OpenAiVisionProvider::new(model, &config.api_url, api_key, client.clone())
                        .with_sampling(config.temperature, config.max_tokens),
                ) as Arc<dyn VisionProvider>
            })
            .collect())
    }

    fn build_body<'a>(&'a self, request: &'a VisionRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: &request.prompt,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: &request.image_data_uri,
                        },
                    },
                ],
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        }
    }
}

#[async_trait]
impl VisionProvider for OpenAiVisionProvider {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &VisionRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(LOGGED_BODY_CHARS).collect(),
            });
        }

        let text = response.text().await.map_err(map_reqwest_error)?;
        debug!(provider = %self.model, bytes = text.len(), "Provider replied");

        let envelope: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Envelope(e.to_string()))?;

        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::Envelope("no message content".to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(err.to_string())
    }
}
