//! Model fallback sequencing

use super::sampler::{SampleOutcome, Sampler, Strategy, MISSING_DISTANCE};
use crate::providers::{ModelRoute, ProviderError, ProviderResult};
use crate::storage::{Candidate, Usage};
use crate::tasks::Task;
use crate::verifiers::Diagnostics;

/// Result of running one task across an ordered model list
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub outcome: SampleOutcome,
    /// `backend/model` that produced the returned outcome
    pub model_used: String,
    /// Number of models tried, including the one returned
    pub attempts: usize,
    /// Usage summed across every attempt
    pub usage: Usage,
}

/// Failing candidate standing in for a model whose generation failed
fn generation_failure(model: &str, error: &ProviderError) -> Candidate {
    Candidate {
        text: String::new(),
        ok: false,
        score: 0.0,
        meta: Diagnostics::Failure {
            error: "generation_error".to_string(),
            detail: Some(error.to_string()),
        },
        distance: MISSING_DISTANCE,
        canonical: None,
        model: model.to_string(),
        usage: Usage::default(),
    }
}

/// Try each model in order until one produces an `ok` result.
///
/// A generation error counts as a failed attempt and moves on to the next
/// model. When every model fails, the last attempt is returned, not the best.
pub async fn run_with_fallback(
    sampler: &Sampler,
    task: &Task,
    routes: &[ModelRoute],
    strategy: Strategy,
    n: usize,
    temperature: f32,
) -> ProviderResult<FallbackOutcome> {
    let mut usage = Usage::default();
    let mut last: Option<FallbackOutcome> = None;

    for (i, route) in routes.iter().enumerate() {
        let model = route.spec.to_string();
        let outcome = match sampler.sample(task, route, strategy, n, temperature).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Task {}: {} failed to generate: {}", task.id, model, e);
                let failed = generation_failure(&model, &e);
                SampleOutcome {
                    best: failed.clone(),
                    candidates: vec![failed],
                }
            }
        };
        usage.add(&outcome.usage());

        let ok = outcome.best.ok;
        last = Some(FallbackOutcome {
            outcome,
            model_used: model,
            attempts: i + 1,
            usage,
        });

        if ok {
            break;
        }
        if let Some(next) = routes.get(i + 1) {
            tracing::info!("Task {}: falling back from {} to {}", task.id, route.spec, next.spec);
        }
    }

    last.ok_or_else(|| ProviderError::Config("fallback requires at least one model".to_string()))
}
