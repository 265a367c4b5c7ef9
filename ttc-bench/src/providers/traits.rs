//! Provider trait definitions for model backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request for one generation
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    /// Ask the backend to constrain output to JSON, where supported
    pub json_mode: bool,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature,
            top_p: None,
            json_mode: false,
        }
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Text produced by a backend, with usage accounting
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

impl Generation {
    /// A generation with no usage information
    pub fn text_only(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::Timeout { .. } | ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Parse(_) | ProviderError::Config(_) => false,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A model backend able to turn a prompt into text
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Backend name (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Model used when a request names none
    fn default_model(&self) -> &str;

    /// Generate a completion for the request
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Generation>;
}

/// A `backend/model` pair such as `ollama/llama3.2:1b-instruct`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub backend: String,
    pub model: String,
}

impl ModelSpec {
    pub fn new(backend: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            model: model.into(),
        }
    }
}

impl std::str::FromStr for ModelSpec {
    type Err = String;

    /// Split on the first `/`, so model names may themselves contain slashes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((backend, model)) if !backend.is_empty() && !model.is_empty() => {
                Ok(Self::new(backend, model))
            }
            _ => Err(format!("model spec `{}` must look like backend/model", s)),
        }
    }
}

impl std::fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.backend, self.model)
    }
}
