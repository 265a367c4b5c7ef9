//! Configuration management for the benchmark harness
//!
//! Loads backend, pricing, execution and sandbox settings from TOML files and
//! hands them to the components that need them at construction time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// Local Ollama server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    /// Fall back to `ollama run` when the HTTP API is unreachable
    #[serde(default = "default_true")]
    pub cli_fallback: bool,
    #[serde(default = "default_ollama_cli")]
    pub cli_command: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            cli_fallback: true,
            cli_command: default_ollama_cli(),
        }
    }
}

/// OpenAI-compatible chat completions API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    /// Per-model prices used for cost estimates
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        let mut pricing = HashMap::new();
        pricing.insert("gpt-4o".to_string(), ModelPricing::per_million(5.0, 15.0));
        pricing.insert("gpt-4o-mini".to_string(), ModelPricing::per_million(0.15, 0.60));
        Self {
            base_url: default_openai_base_url(),
            api_key_env: default_openai_key_env(),
            pricing,
        }
    }
}

/// USD price per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn per_million(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
        }
    }

    /// Estimated cost of one call
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_million + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Benchmark execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Upper bound on a single generation call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_run_root")]
    pub run_root: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            top_p: default_top_p(),
            run_root: default_run_root(),
            report_dir: default_report_dir(),
        }
    }
}

/// Code execution sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_ms: default_sandbox_timeout_ms(),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_ollama_base_url() -> String { "http://localhost:11434".to_string() }
fn default_ollama_cli() -> String { "ollama".to_string() }
fn default_openai_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_openai_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_timeout_ms() -> u64 { 600_000 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_max_retry_delay_ms() -> u64 { 60_000 }
fn default_top_p() -> f32 { 0.95 }
fn default_run_root() -> String { "runs".to_string() }
fn default_report_dir() -> String { "reports".to_string() }
fn default_python() -> String { "python3".to_string() }
fn default_sandbox_timeout_ms() -> u64 { 10_000 }

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/ttc.toml",
            "ttc-bench/config/ttc.toml",
        ];

        for path in &config_paths {
            if let Ok(config) = Self::from_file(path) {
                tracing::info!("Loaded configuration from {}", path);
                return config;
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
