//! Model backend implementations

pub mod ollama;
pub mod openai;
pub mod traits;

pub use ollama::OllamaClient;
pub use openai::OpenAIClient;
pub use traits::{
    Generation, GenerationRequest, LLMProvider, ModelSpec, ProviderError, ProviderResult,
};

use crate::config::Config;
use std::sync::Arc;

/// Backends known to the harness
pub const BACKENDS: &[&str] = &["ollama", "openai"];

/// Enum to hold any provider type
pub enum Provider {
    Ollama(OllamaClient),
    OpenAI(OpenAIClient),
}

impl Provider {
    /// Create a provider by backend name, applying settings from config
    pub fn from_name(name: &str, config: &Config) -> ProviderResult<Self> {
        match name.to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama(OllamaClient::from_config(&config.providers.ollama))),
            "openai" | "gpt" => Ok(Provider::OpenAI(OpenAIClient::from_config(&config.providers.openai)?)),
            _ => Err(ProviderError::Config(format!(
                "Unknown backend: {} (expected one of {})",
                name,
                BACKENDS.join(", ")
            ))),
        }
    }

    fn into_shared(self) -> Arc<dyn LLMProvider> {
        match self {
            Provider::Ollama(c) => Arc::new(c),
            Provider::OpenAI(c) => Arc::new(c),
        }
    }
}

/// A model together with the backend client that serves it
#[derive(Clone)]
pub struct ModelRoute {
    pub spec: ModelSpec,
    pub provider: Arc<dyn LLMProvider>,
}

impl ModelRoute {
    pub fn new(spec: ModelSpec, provider: Arc<dyn LLMProvider>) -> Self {
        Self { spec, provider }
    }
}

impl std::fmt::Debug for ModelRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRoute")
            .field("spec", &self.spec.to_string())
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Resolve one model spec to a route
pub fn create_route(spec: &ModelSpec, config: &Config) -> ProviderResult<ModelRoute> {
    let provider = Provider::from_name(&spec.backend, config)?.into_shared();
    Ok(ModelRoute::new(spec.clone(), provider))
}

/// Resolve every spec up front, sharing one client per backend
pub fn create_routes(specs: &[ModelSpec], config: &Config) -> ProviderResult<Vec<ModelRoute>> {
    let mut clients: Vec<(String, Arc<dyn LLMProvider>)> = Vec::new();
    let mut routes = Vec::with_capacity(specs.len());

    for spec in specs {
        let backend = spec.backend.to_lowercase();
        let provider = match clients.iter().find(|(name, _)| *name == backend) {
            Some((_, provider)) => provider.clone(),
            None => {
                let provider = Provider::from_name(&backend, config)?.into_shared();
                clients.push((backend, provider.clone()));
                provider
            }
        };
        routes.push(ModelRoute::new(spec.clone(), provider));
    }

    Ok(routes)
}
