//! Evaluation driver

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use super::fallback::run_with_fallback;
use super::generate::{Generator, GeneratorConfig};
use super::sampler::{Sampler, Strategy};
use crate::config::Config;
use crate::providers::{create_routes, ModelRoute, ModelSpec, ProviderError, ProviderResult};
use crate::storage::{accuracy, EvaluationResult, RunConfig, RunStore, RunSummary, StoreError, Usage};
use crate::tasks::Task;
use crate::verifiers::{AnswerNormalizer, PythonSandbox};

/// Errors that end a run
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Generation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// What to evaluate and how
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub task_path: String,
    pub model: ModelSpec,
    pub strategy: Strategy,
    pub n: usize,
    pub temperature: f32,
    /// Models tried after `model`, in order; empty disables fallback
    pub fallback: Vec<ModelSpec>,
    pub json_mode: bool,
    pub meta_notes: Option<String>,
}

impl RunOptions {
    pub fn new(task_path: impl Into<String>, model: ModelSpec) -> Self {
        Self {
            task_path: task_path.into(),
            model,
            strategy: Strategy::Single,
            n: 1,
            temperature: 0.7,
            fallback: Vec::new(),
            json_mode: false,
            meta_notes: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy, n: usize) -> Self {
        self.strategy = strategy;
        self.n = n.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_fallback(mut self, fallback: Vec<ModelSpec>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_meta_notes(mut self, notes: Option<String>) -> Self {
        self.meta_notes = notes;
        self
    }

    /// Primary model followed by the fallback models
    pub fn models(&self) -> Vec<ModelSpec> {
        std::iter::once(self.model.clone())
            .chain(self.fallback.iter().cloned())
            .collect()
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub dir: PathBuf,
    pub summary: RunSummary,
    pub results: Vec<EvaluationResult>,
}

/// Runs a task set through the configured strategy and records the results
pub struct Evaluator {
    sampler: Sampler,
    /// Primary route first, then fallbacks
    routes: Vec<ModelRoute>,
    options: RunOptions,
    cancel: Arc<AtomicBool>,
}

impl Evaluator {
    pub fn new(sampler: Sampler, routes: Vec<ModelRoute>, options: RunOptions) -> Self {
        Self {
            sampler,
            routes,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build providers, generator, and sandbox from configuration.
    ///
    /// Fails on an unknown backend or missing credentials, before any
    /// artifacts exist.
    pub fn from_config(config: &Config, options: RunOptions) -> ProviderResult<Self> {
        let routes = create_routes(&options.models(), config)?;
        let generator = Generator::new(
            GeneratorConfig::from(&config.benchmark).with_json_mode(options.json_mode),
        );
        let normalizer = AnswerNormalizer::new(Arc::new(PythonSandbox::from_config(&config.sandbox)));
        Ok(Self::new(Sampler::new(generator, normalizer), routes, options))
    }

    /// Share an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Evaluate one task, with fallback when fallback models are configured
    pub async fn evaluate_task(&self, task: &Task) -> Result<EvaluationResult, ProviderError> {
        let opts = &self.options;

        let (outcome, model_used, usage) = if self.routes.len() > 1 {
            let result = run_with_fallback(
                &self.sampler,
                task,
                &self.routes,
                opts.strategy,
                opts.n,
                opts.temperature,
            )
            .await?;
            (result.outcome, result.model_used, result.usage)
        } else {
            let route = self
                .routes
                .first()
                .ok_or_else(|| ProviderError::Config("no model configured".to_string()))?;
            let outcome = self
                .sampler
                .sample(task, route, opts.strategy, opts.n, opts.temperature)
                .await?;
            let usage = outcome.usage();
            (outcome, route.spec.to_string(), usage)
        };

        let best = outcome.best;
        Ok(EvaluationResult {
            task_id: task.id.clone(),
            kind: task.kind.clone(),
            ok: best.ok,
            score: best.score,
            meta: best.meta,
            text: best.text,
            strategy: opts.strategy,
            n: opts.n,
            model_used,
            candidates: outcome.candidates,
            usage,
        })
    }

    /// Evaluate `tasks` in order, streaming each result to `store`.
    ///
    /// Cancellation is honoured between tasks; the summary then covers the
    /// completed tasks and is marked cancelled. A fatal error leaves the
    /// streamed log in place and writes no summary.
    pub async fn run(&self, tasks: &[Task], store: &mut RunStore) -> Result<RunOutcome, EvalError> {
        let opts = &self.options;
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(tasks.len());
        let mut cancelled = false;

        tracing::info!(
            "Evaluating {} tasks with {} (strategy={}, n={}, temperature={})",
            tasks.len(),
            opts.model,
            opts.strategy,
            opts.n,
            opts.temperature
        );

        for (i, task) in tasks.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!("Cancelled after {} of {} tasks", i, tasks.len());
                cancelled = true;
                break;
            }

            let result = self.evaluate_task(task).await?;
            tracing::info!(
                "[{}/{}] {} ok={} score={:.3} via {}",
                i + 1,
                tasks.len(),
                result.task_id,
                result.ok,
                result.score,
                result.model_used
            );
            store.append(&result)?;
            results.push(result);
        }

        let usage: Usage = results.iter().map(|r| &r.usage).sum();
        let fallback_models = (!opts.fallback.is_empty())
            .then(|| opts.fallback.iter().map(ToString::to_string).collect::<Vec<_>>());

        let summary = RunSummary {
            task_path: opts.task_path.clone(),
            model_backend: opts.model.backend.clone(),
            model_name: opts.model.model.clone(),
            strategy: opts.strategy,
            n: opts.n,
            temperature: opts.temperature,
            fallback_models: fallback_models.clone(),
            meta_notes: opts.meta_notes.clone(),
            num_tasks: results.len(),
            num_correct: results.iter().filter(|r| r.ok).count(),
            accuracy: accuracy(&results),
            duration_sec: start.elapsed().as_secs_f64(),
            started_at,
            completed_at: Utc::now(),
            total_cost_usd: usage.cost_usd,
            total_input_tokens: usage.input_tokens,
            total_output_tokens: usage.output_tokens,
            cancelled,
        };

        let generator = self.sampler.generator().config();
        let run_config = RunConfig {
            task_path: opts.task_path.clone(),
            model: opts.model.to_string(),
            strategy: opts.strategy,
            n: opts.n,
            temperature: opts.temperature,
            top_p: generator.top_p.unwrap_or(1.0),
            json_mode: opts.json_mode,
            fallback_models: fallback_models.unwrap_or_default(),
            meta_notes: opts.meta_notes.clone(),
            timeout_ms: generator.timeout_ms,
            retry_count: generator.retry_count,
            created_at: started_at,
        };

        store.write_summary(&summary)?;
        store.write_config(&run_config)?;

        tracing::info!(
            "Run complete: accuracy {:.4} over {} tasks in {:.1}s",
            summary.accuracy,
            summary.num_tasks,
            summary.duration_sec
        );

        Ok(RunOutcome {
            dir: store.dir().to_path_buf(),
            summary,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Generation, GenerationRequest, LLMProvider};
    use crate::storage::{load_details, load_summary};
    use crate::verifiers::{NumericSpec, VerifierSpec};
    use async_trait::async_trait;

    /// Always answers 4
    struct Echo;

    #[async_trait]
    impl LLMProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn default_model(&self) -> &str {
            "m"
        }

        async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Generation> {
            Ok(Generation::text_only("Final answer: 4", &request.model))
        }
    }

    fn numeric(id: &str, answer: f64) -> Task {
        Task::single(
            id,
            "What is 2+2?",
            VerifierSpec::Numeric(NumericSpec { answer, tol: 1e-6 }),
        )
    }

    fn evaluator() -> Evaluator {
        let spec = ModelSpec::new("echo", "m");
        let route = ModelRoute::new(spec.clone(), Arc::new(Echo));
        let sampler = Sampler::new(Generator::default(), AnswerNormalizer::default());
        Evaluator::new(sampler, vec![route], RunOptions::new("tasks.jsonl", spec))
    }

    #[tokio::test]
    async fn test_run_writes_log_and_summary() {
        let root = tempfile::tempdir().unwrap();
        let mut store = RunStore::create(root.path()).unwrap();
        let tasks = vec![numeric("a", 4.0), numeric("b", 5.0), numeric("c", 4.0)];

        let outcome = evaluator().run(&tasks, &mut store).await.unwrap();
        assert_eq!(outcome.summary.num_tasks, 3);
        assert_eq!(outcome.summary.num_correct, 2);
        assert_eq!(outcome.summary.accuracy, 2.0 / 3.0);
        assert!(!outcome.summary.cancelled);

        let logged = load_details(&outcome.dir).unwrap();
        assert_eq!(logged, outcome.results);
        assert_eq!(load_summary(&outcome.dir).unwrap().model_backend, "echo");
    }

    #[tokio::test]
    async fn test_empty_task_set_has_zero_accuracy() {
        let root = tempfile::tempdir().unwrap();
        let mut store = RunStore::create(root.path()).unwrap();
        let outcome = evaluator().run(&[], &mut store).await.unwrap();
        assert_eq!(outcome.summary.accuracy, 0.0);
        assert_eq!(outcome.summary.num_tasks, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_tasks() {
        let root = tempfile::tempdir().unwrap();
        let mut store = RunStore::create(root.path()).unwrap();
        let evaluator = evaluator();
        evaluator.cancel_flag().store(true, Ordering::SeqCst);

        let outcome = evaluator.run(&[numeric("a", 4.0)], &mut store).await.unwrap();
        assert!(outcome.summary.cancelled);
        assert!(outcome.results.is_empty());
        assert!(load_details(&outcome.dir).unwrap().is_empty());
    }

    #[test]
    fn test_models_put_primary_first() {
        let options = RunOptions::new("t", ModelSpec::new("ollama", "a"))
            .with_fallback(vec![ModelSpec::new("ollama", "b")])
            .with_strategy(Strategy::BestOfN, 0);
        let models: Vec<String> = options.models().iter().map(ToString::to_string).collect();
        assert_eq!(models, vec!["ollama/a", "ollama/b"]);
        assert_eq!(options.n, 1);
        assert_eq!(options.temperature, 0.7);
    }
}
