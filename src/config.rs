//! Explicit configuration for the language model client.
//!
//! Everything environment-derived is gathered here in one constructor rather
//! than scattered through the code. Defaults are documented on the fields;
//! only the API key is required.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PlotError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.opentyphoon.ai/v1";
pub const DEFAULT_MODEL: &str = "typhoon-v1.5x-70b-instruct";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Configuration for the chat-completions client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible endpoint. Default:
    /// [`DEFAULT_BASE_URL`].
    pub base_url: String,
    /// Model name. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// API key. Required; there is no ambient fallback.
    pub api_key: String,
    /// Sampling temperature. Default: 0 (deterministic code generation).
    pub temperature: f32,
    /// HTTP request timeout in seconds. Default:
    /// [`DEFAULT_REQUEST_TIMEOUT_SECS`].
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Load configuration from the environment:
    /// `PANDAS_BASE_URL`, `PANDAS_MODEL`, `PANDAS_TEMPERATURE` (all optional)
    /// and `PLOT_API_KEY` (required).
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("PLOT_API_KEY").map_err(|_| PlotError::MissingApiKey)?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = env::var("PANDAS_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = env::var("PANDAS_MODEL") {
            config.model = model;
        }
        if let Ok(temperature) = env::var("PANDAS_TEMPERATURE") {
            if let Ok(value) = temperature.parse::<f32>() {
                config.temperature = value;
            }
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
