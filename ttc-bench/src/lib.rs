//! Test-time compute benchmark harness
//!
//! Evaluates language models on line-delimited task files under different
//! sampling strategies and records how often each answer verifies.
//!
//! # Features
//!
//! - Numeric, JSON, regex, and executable-code verifiers, alone or chained
//! - Single-shot, best-of-N, and self-consistency sampling
//! - Ordered model fallback across Ollama and OpenAI backends
//! - Streaming run logs with summary snapshots, HTML and Markdown reports
//!
//! # Example
//!
//! ```no_run
//! use ttc_bench::{
//!     config::Config,
//!     providers::ModelSpec,
//!     runner::{Evaluator, RunOptions, Strategy},
//!     storage::RunStore,
//!     tasks::load_tasks_from_file,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default();
//!     let tasks = load_tasks_from_file("tasks/gsm.jsonl")?;
//!
//!     let model: ModelSpec = "ollama/llama3.2:1b-instruct".parse()?;
//!     let options = RunOptions::new("tasks/gsm.jsonl", model)
//!         .with_strategy(Strategy::SelfConsistency, 5)
//!         .with_temperature(0.7);
//!
//!     let evaluator = Evaluator::from_config(&config, options)?;
//!     let mut store = RunStore::create(&config.benchmark.run_root)?;
//!     let outcome = evaluator.run(&tasks, &mut store).await?;
//!     println!("accuracy: {:.3}", outcome.summary.accuracy);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod providers;
pub mod reporting;
pub mod runner;
pub mod storage;
pub mod tasks;
pub mod verifiers;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::providers::{
        create_routes, Generation, GenerationRequest, LLMProvider, ModelRoute, ModelSpec,
        ProviderError, ProviderResult,
    };
    pub use crate::reporting::{print_console_report, write_comparison, write_run_report};
    pub use crate::runner::{EvalError, Evaluator, RunOptions, RunOutcome, Sampler, Strategy};
    pub use crate::storage::{Candidate, EvaluationResult, RunStore, RunSummary, Usage};
    pub use crate::tasks::{build_prompt, load_tasks_from_file, Task, TaskCheck};
    pub use crate::verifiers::{AnswerNormalizer, CodeSandbox, PythonSandbox, Verdict, VerifierSpec};
}
