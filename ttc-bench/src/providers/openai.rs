//! OpenAI chat-completions client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use super::traits::{Generation, GenerationRequest, LLMProvider, ProviderError, ProviderResult};
use crate::config::{ModelPricing, OpenAIConfig};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI API client with per-model cost estimates
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    default_model: String,
    pricing: HashMap<String, ModelPricing>,
}

impl OpenAIClient {
    /// Create a new OpenAI client
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            http_client: Client::new(),
            default_model: DEFAULT_MODEL.to_string(),
            pricing: HashMap::new(),
        }
    }

    /// Create from configuration, reading the key from the configured variable
    pub fn from_config(config: &OpenAIConfig) -> ProviderResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ProviderError::Config(format!("{} not set", config.api_key_env)))?;
        Ok(Self::new(api_key)
            .with_base_url(&config.base_url)
            .with_pricing(config.pricing.clone()))
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the price table used for cost estimates
    pub fn with_pricing(mut self, pricing: HashMap<String, ModelPricing>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Estimated cost; unknown models cost nothing
    fn estimate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.pricing
            .get(model)
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    model: String,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Pass successful responses through and map failures to provider errors.
///
/// A 429 means either throttling or an exhausted quota; only throttling is
/// transient.
async fn error_for_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<OpenAIError>(&body).ok().map(|e| e.error);
    let code = status.as_u16();

    match (code, detail) {
        (429, Some(d)) if d.error_type.as_deref() == Some("insufficient_quota") => {
            Err(ProviderError::Config(format!("OpenAI quota exhausted: {}", d.message)))
        }
        (429, d) => {
            if let Some(d) = d {
                tracing::debug!("OpenAI throttled request: {}", d.message);
            }
            Err(ProviderError::RateLimited {
                retry_after_ms: retry_after_ms.unwrap_or(60_000),
            })
        }
        (401 | 403, d) => Err(ProviderError::Config(format!(
            "OpenAI rejected credentials ({}): {}",
            code,
            d.map(|d| d.message).unwrap_or(body)
        ))),
        (_, d) => Err(ProviderError::Api {
            status: code,
            message: d.map(|d| d.message).unwrap_or(body),
        }),
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Generation> {
        let start = Instant::now();

        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let body = OpenAIRequest {
            model,
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: Some(request.prompt.clone()),
            }],
            temperature: request.temperature,
            top_p: request.top_p,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let response = error_for_status(response).await?;

        let api_response: OpenAIResponse = response.json().await?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?
            .message
            .content
            .unwrap_or_default();

        let (input_tokens, output_tokens) = api_response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Generation {
            text,
            cost_usd: self.estimate_cost(model, input_tokens, output_tokens),
            model: api_response.model,
            input_tokens,
            output_tokens,
            latency_ms,
        })
    }
}
