//! Ollama client: HTTP API with an `ollama run` fallback

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::process::Command;

use super::traits::{Generation, GenerationRequest, LLMProvider, ProviderError, ProviderResult};
use crate::config::OllamaConfig;

const DEFAULT_MODEL: &str = "llama3.2:1b-instruct";

/// Client for a local Ollama server
pub struct OllamaClient {
    base_url: String,
    http_client: Client,
    default_model: String,
    /// Command used for the CLI fallback; `None` disables it
    cli_command: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: Client::new(),
            default_model: DEFAULT_MODEL.to_string(),
            cli_command: Some("ollama".to_string()),
        }
    }

    pub fn from_config(config: &OllamaConfig) -> Self {
        let client = Self::new(&config.base_url);
        if config.cli_fallback {
            client.with_cli_command(&config.cli_command)
        } else {
            client.without_cli_fallback()
        }
    }

    pub fn with_cli_command(mut self, command: impl Into<String>) -> Self {
        self.cli_command = Some(command.into());
        self
    }

    pub fn without_cli_fallback(mut self) -> Self {
        self.cli_command = None;
        self
    }

    async fn http_generate(&self, model: &str, request: &GenerationRequest) -> ProviderResult<Generation> {
        let body = OllamaRequest {
            model,
            prompt: &request.prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
            },
            format: request.json_mode.then_some("json"),
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: OllamaResponse = response.json().await?;
        Ok(Generation {
            text: api_response.response,
            model: model.to_string(),
            input_tokens: api_response.prompt_eval_count.unwrap_or(0),
            output_tokens: api_response.eval_count.unwrap_or(0),
            cost_usd: 0.0,
            latency_ms: 0,
        })
    }

    /// Sampling options are not available through the CLI
    async fn cli_generate(&self, command: &str, model: &str, prompt: &str) -> ProviderResult<Generation> {
        let output = Command::new(command)
            .arg("run")
            .arg(model)
            .arg(prompt)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Config(format!("failed to run {}: {}", command, e)))?;

        if !output.status.success() {
            return Err(ProviderError::Config(format!(
                "`{} run` exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(Generation::text_only(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            model,
        ))
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl LLMProvider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
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

        let http_error = match self.http_generate(model, request).await {
            Ok(mut generation) => {
                generation.latency_ms = start.elapsed().as_millis() as u64;
                return Ok(generation);
            }
            Err(e) => e,
        };

        let Some(command) = self.cli_command.as_deref() else {
            return Err(http_error);
        };

        tracing::debug!("Ollama HTTP API failed ({}), trying `{} run`", http_error, command);
        match self.cli_generate(command, model, &request.prompt).await {
            Ok(mut generation) => {
                generation.latency_ms = start.elapsed().as_millis() as u64;
                Ok(generation)
            }
            Err(cli_error) => Err(ProviderError::Config(format!(
                "Failed to generate with Ollama ({}; {}). Is it running and is the model pulled?",
                http_error, cli_error
            ))),
        }
    }
}
