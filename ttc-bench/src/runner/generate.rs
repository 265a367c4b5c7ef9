//! Bounded, retrying generation calls

use std::time::Duration;
use tokio::time::sleep;

use crate::config::BenchmarkConfig;
use crate::providers::{Generation, GenerationRequest, ModelRoute, ProviderError, ProviderResult};

/// Configuration for generation calls
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Upper bound on one provider call
    pub timeout_ms: u64,
    /// Number of retries on transient failure
    pub retry_count: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    pub top_p: Option<f32>,
    pub json_mode: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from(&BenchmarkConfig::default())
    }
}

impl From<&BenchmarkConfig> for GeneratorConfig {
    fn from(config: &BenchmarkConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            retry_count: config.retry_count,
            retry_delay_ms: config.retry_delay_ms,
            max_retry_delay_ms: config.max_retry_delay_ms,
            top_p: Some(config.top_p),
            json_mode: false,
        }
    }
}

impl GeneratorConfig {
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Issues generation calls with a timeout and exponential backoff
#[derive(Debug, Clone, Default)]
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate once for `route`, retrying transient failures
    pub async fn generate(
        &self,
        route: &ModelRoute,
        prompt: &str,
        temperature: f32,
    ) -> ProviderResult<Generation> {
        let mut request = GenerationRequest::new(&route.spec.model, prompt, temperature)
            .with_json_mode(self.config.json_mode);
        if let Some(top_p) = self.config.top_p {
            request = request.with_top_p(top_p);
        }

        let mut delay = self.config.retry_delay_ms;
        let mut attempt = 0;

        loop {
            let error = match self.try_generate(route, &request).await {
                Ok(generation) => return Ok(generation),
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= self.config.retry_count {
                tracing::error!("Generation failed on {}: {}", route.spec, error);
                return Err(error);
            }
            attempt += 1;

            match error {
                ProviderError::RateLimited { retry_after_ms } => {
                    tracing::warn!("Rate limited on {}, waiting {}ms", route.spec, retry_after_ms);
                    sleep(Duration::from_millis(retry_after_ms)).await;
                }
                e => {
                    tracing::info!(
                        "Retry {} on {} in {}ms after: {}",
                        attempt,
                        route.spec,
                        delay,
                        e
                    );
                    sleep(Duration::from_millis(delay)).await;
                    delay = (delay * 2).min(self.config.max_retry_delay_ms);
                }
            }
        }
    }

    /// Single attempt under the configured timeout
    async fn try_generate(
        &self,
        route: &ModelRoute,
        request: &GenerationRequest,
    ) -> ProviderResult<Generation> {
        let timeout = Duration::from_millis(self.config.timeout_ms);

        match tokio::time::timeout(timeout, route.provider.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }
}
