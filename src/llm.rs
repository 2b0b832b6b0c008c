//! Language model collaborator: an OpenAI-compatible chat-completions client.
//!
//! The orchestrator only depends on the [`LanguageModel`] trait; anything
//! returning a response with an `output` text field will do, and tests stub
//! it. The shipped implementation is a plain non-streaming reqwest client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::errors::{PlotError, Result};

/// Opaque model response. `output` is the free text that may contain a code
/// block; anything the backend failed to supply is treated as absent output.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub output: Option<String>,
}

impl ModelResponse {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
        }
    }

    pub fn empty() -> Self {
        Self { output: None }
    }
}

/// Trait for the model call. One prompt in, one response out, no streaming.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<ModelResponse>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client over an OpenAI-compatible endpoint.
#[derive(Debug)]
pub struct ChatModelClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl ChatModelClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LanguageModel for ChatModelClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<ModelResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| PlotError::ModelRequest(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);

        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
        });

        debug!(model = %self.config.model, "requesting completion");
        let response = self
            .http
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(PlotError::ModelRequest(format!("{status}: {detail}")));
        }

        let completion: ChatCompletion = response.json().await?;
        Ok(completion_output(completion))
    }
}

/// First choice's message content, or absent output.
fn completion_output(completion: ChatCompletion) -> ModelResponse {
    let output = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty());
    ModelResponse { output }
}
