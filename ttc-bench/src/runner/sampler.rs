//! Sampling strategies
//!
//! A strategy turns one or more generations for a task into one chosen
//! [`Candidate`]. Selection is split from drawing so the ranking rules can be
//! exercised without a model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::generate::Generator;
use crate::providers::{ModelRoute, ProviderResult};
use crate::storage::{Candidate, Usage};
use crate::tasks::{build_prompt, Task};
use crate::verifiers::{canonical_json, AnswerNormalizer, Verdict};

/// Distance used when a numeric candidate has no parsed value
pub const MISSING_DISTANCE: f64 = 1e9;

/// How candidates are drawn and one is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One generation
    #[default]
    #[value(name = "single")]
    Single,
    /// Highest score, then smallest distance
    #[value(name = "best_of_n")]
    BestOfN,
    /// Majority vote over canonicalized answers
    #[value(name = "self_consistency")]
    SelfConsistency,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::BestOfN => "best_of_n",
            Strategy::SelfConsistency => "self_consistency",
        }
    }

    /// Number of generations drawn for a requested `n`
    pub fn draws(&self, n: usize) -> usize {
        match self {
            Strategy::Single => 1,
            _ => n.max(1),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chosen candidate and everything drawn to find it
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub best: Candidate,
    pub candidates: Vec<Candidate>,
}

impl SampleOutcome {
    pub fn usage(&self) -> Usage {
        self.candidates.iter().map(|c| &c.usage).sum()
    }
}

/// Ranking distance: absolute error for numeric tasks, `1 - score` otherwise
pub fn candidate_distance(task: &Task, verdict: &Verdict) -> f64 {
    if task.is_numeric() {
        verdict.diagnostics.abs_error().map(f64::abs).unwrap_or(MISSING_DISTANCE)
    } else {
        1.0 - verdict.score
    }
}

/// Grouping key for majority voting.
///
/// Numeric tasks group by parsed value and JSON tasks by a deep, key-sorted
/// serialization of the parsed object; a candidate that did not parse gets no
/// key. Everything else groups by trimmed text.
pub fn canonical_key(task: &Task, text: &str, verdict: &Verdict) -> Option<String> {
    if task.is_numeric() {
        verdict.diagnostics.parsed_number().map(|v| format!("{:?}", v))
    } else if task.is_json() {
        verdict.diagnostics.parsed_json().map(canonical_json)
    } else {
        Some(text.trim().to_string())
    }
}

/// Verify a response and turn it into a candidate
pub fn score_candidate(
    normalizer: &AnswerNormalizer,
    task: &Task,
    text: String,
    model: impl Into<String>,
    usage: Usage,
) -> Candidate {
    let verdict = normalizer.normalize(task, &text);
    let distance = candidate_distance(task, &verdict);
    let canonical = canonical_key(task, &text, &verdict);
    Candidate {
        ok: verdict.passed,
        score: verdict.score,
        meta: verdict.diagnostics,
        distance,
        canonical,
        model: model.into(),
        usage,
        text,
    }
}

/// Index of the best candidate by `(score desc, distance asc)`, first wins ties
pub fn select_best_of_n(candidates: &[Candidate]) -> Option<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&candidates[a], &candidates[b]);
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.distance.total_cmp(&b.distance))
    });
    order.first().copied()
}

/// Index of the highest-scoring candidate in the most common canonical group.
///
/// Ties between groups go to the group seen first. With no keyed candidates
/// the first candidate is chosen.
pub fn select_majority(candidates: &[Candidate]) -> Option<usize> {
    let mut tally: IndexMap<&str, usize> = IndexMap::new();
    for key in candidates.iter().filter_map(|c| c.canonical.as_deref()) {
        *tally.entry(key).or_insert(0) += 1;
    }

    let mut majority: Option<(&str, usize)> = None;
    for (&key, &count) in &tally {
        if majority.map_or(true, |(_, best)| count > best) {
            majority = Some((key, count));
        }
    }

    let Some((key, _)) = majority else {
        return if candidates.is_empty() { None } else { Some(0) };
    };

    let mut chosen: Option<usize> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.canonical.as_deref() != Some(key) {
            continue;
        }
        if chosen.map_or(true, |c| candidate.score > candidates[c].score) {
            chosen = Some(i);
        }
    }
    chosen
}

/// Draws candidates for one task from one model
#[derive(Clone)]
pub struct Sampler {
    generator: Generator,
    normalizer: AnswerNormalizer,
}

impl Sampler {
    pub fn new(generator: Generator, normalizer: AnswerNormalizer) -> Self {
        Self {
            generator,
            normalizer,
        }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Score one response. Code tasks block on a child interpreter, so they
    /// are verified on the blocking pool.
    async fn score(&self, task: &Task, text: String, model: &str, usage: Usage) -> Candidate {
        if !task.runs_code() {
            return score_candidate(&self.normalizer, task, text, model, usage);
        }

        let normalizer = self.normalizer.clone();
        let owned_task = task.clone();
        let owned_model = model.to_string();
        let fallback_text = text.clone();
        let scored = tokio::task::spawn_blocking(move || {
            score_candidate(&normalizer, &owned_task, text, owned_model, usage)
        })
        .await;

        match scored {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!("Verification of task {} did not complete: {}", task.id, e);
                let verdict = Verdict::failure("sandbox_error", Some(e.to_string()));
                Candidate {
                    ok: false,
                    score: verdict.score,
                    distance: candidate_distance(task, &verdict),
                    canonical: canonical_key(task, &fallback_text, &verdict),
                    meta: verdict.diagnostics,
                    model: model.to_string(),
                    usage,
                    text: fallback_text,
                }
            }
        }
    }

    /// Run `strategy` for `task` on `route`.
    ///
    /// Samples are drawn sequentially. A generation failure aborts the task.
    pub async fn sample(
        &self,
        task: &Task,
        route: &ModelRoute,
        strategy: Strategy,
        n: usize,
        temperature: f32,
    ) -> ProviderResult<SampleOutcome> {
        let prompt = build_prompt(task);
        let draws = strategy.draws(n);
        let model = route.spec.to_string();

        let mut candidates = Vec::with_capacity(draws);
        for i in 0..draws {
            let generation = self.generator.generate(route, &prompt, temperature).await?;
            let usage = Usage::from_generation(&generation);
            let candidate = self.score(task, generation.text, &model, usage).await;
            tracing::debug!(
                "Task {} sample {}/{} on {}: ok={} score={:.3}",
                task.id,
                i + 1,
                draws,
                model,
                candidate.ok,
                candidate.score
            );
            candidates.push(candidate);
        }

        let chosen = match strategy {
            Strategy::Single => Some(0),
            Strategy::BestOfN => select_best_of_n(&candidates),
            Strategy::SelfConsistency => select_majority(&candidates),
        };
        // draws >= 1, so a candidate is always chosen
        let best = candidates[chosen.unwrap_or(0)].clone();

        Ok(SampleOutcome { best, candidates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Generation, GenerationRequest, LLMProvider, ModelSpec};
    use crate::runner::generate::GeneratorConfig;
    use crate::tasks::TaskCheck;
    use crate::verifiers::{
        CaseOutcome, CodeCase, CodeSandbox, CodeSpec, Diagnostics, NumericSpec, SandboxError,
        SandboxReport, VerifierSpec,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn candidate(text: &str, score: f64, distance: f64, canonical: Option<&str>) -> Candidate {
        Candidate {
            text: text.to_string(),
            ok: score >= 1.0,
            score,
            meta: Diagnostics::ExactMatch,
            distance,
            canonical: canonical.map(str::to_string),
            model: "test/m".to_string(),
            usage: Usage::default(),
        }
    }

    fn numeric_task() -> Task {
        Task::single(
            "t1",
            "2+2?",
            VerifierSpec::Numeric(NumericSpec { answer: 4.0, tol: 0.01 }),
        )
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(serde_json::to_string(&Strategy::BestOfN).unwrap(), "\"best_of_n\"");
        assert_eq!(Strategy::SelfConsistency.to_string(), "self_consistency");
        assert_eq!(Strategy::Single.draws(5), 1);
        assert_eq!(Strategy::BestOfN.draws(0), 1);
    }

    #[test]
    fn test_best_of_n_prefers_score_then_distance() {
        let candidates = vec![
            candidate("a", 0.5, 0.5, None),
            candidate("b", 1.0, 0.3, None),
            candidate("c", 1.0, 0.1, None),
            candidate("d", 1.0, 0.1, None),
        ];
        assert_eq!(select_best_of_n(&candidates), Some(2));
        assert_eq!(select_best_of_n(&[]), None);
    }

    #[test]
    fn test_best_of_one_is_the_only_draw() {
        let candidates = vec![candidate("only", 0.0, MISSING_DISTANCE, None)];
        assert_eq!(select_best_of_n(&candidates), Some(0));
    }

    #[test]
    fn test_majority_picks_largest_group() {
        let candidates = vec![
            candidate("b1", 0.0, 1.0, Some("b")),
            candidate("a1", 0.0, 1.0, Some("a")),
            candidate("b2", 0.0, 1.0, Some("b")),
            candidate("a2", 1.0, 0.0, Some("a")),
            candidate("a3", 0.0, 1.0, Some("a")),
        ];
        let chosen = select_majority(&candidates).unwrap();
        assert_eq!(candidates[chosen].canonical.as_deref(), Some("a"));
        assert_eq!(candidates[chosen].text, "a2");
    }

    #[test]
    fn test_majority_tie_goes_to_first_group() {
        let candidates = vec![
            candidate("x", 0.0, 1.0, Some("x")),
            candidate("y", 1.0, 0.0, Some("y")),
        ];
        assert_eq!(select_majority(&candidates), Some(0));
    }

    #[test]
    fn test_majority_without_keys_falls_back_to_first() {
        let candidates = vec![candidate("p", 0.0, 1.0, None), candidate("q", 1.0, 0.0, None)];
        assert_eq!(select_majority(&candidates), Some(0));
        assert_eq!(select_majority(&[]), None);
    }

    #[test]
    fn test_numeric_candidate_scoring() {
        let normalizer = AnswerNormalizer::default();
        let task = numeric_task();
        let c = score_candidate(&normalizer, &task, "The answer is 4.0".into(), "m", Usage::default());
        assert!(c.ok);
        assert_eq!(c.distance, 0.0);
        assert_eq!(c.canonical.as_deref(), Some("4.0"));

        let c = score_candidate(&normalizer, &task, "no idea".into(), "m", Usage::default());
        assert_eq!(c.distance, MISSING_DISTANCE);
        assert_eq!(c.canonical, None);
    }

    #[test]
    fn test_overflowing_numeric_answer_is_missing() {
        let normalizer = AnswerNormalizer::default();
        let text = format!("1{}", "0".repeat(400));
        let c = score_candidate(&normalizer, &numeric_task(), text, "m", Usage::default());
        assert!(!c.ok);
        assert_eq!(c.distance, MISSING_DISTANCE);
        assert_eq!(c.canonical, None);

        // Must survive a trip through the run log
        let line = serde_json::to_string(&c).unwrap();
        let back: Candidate = serde_json::from_str(&line).unwrap();
        assert_eq!(back.distance, MISSING_DISTANCE);
    }

    /// Records which thread ran each verification
    struct ThreadRecorder(Mutex<Vec<thread::ThreadId>>);

    impl CodeSandbox for ThreadRecorder {
        fn execute(&self, _: &str, _: &str, cases: &[CodeCase]) -> Result<SandboxReport, SandboxError> {
            self.0.lock().unwrap().push(thread::current().id());
            Ok(SandboxReport::Completed {
                cases: cases.iter().map(|c| CaseOutcome { passed: true, got: c.output.clone() }).collect(),
            })
        }
    }

    struct Answers;

    #[async_trait]
    impl LLMProvider for Answers {
        fn name(&self) -> &str {
            "answers"
        }

        fn default_model(&self) -> &str {
            "m"
        }

        async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Generation> {
            Ok(Generation::text_only("def add(a, b): return a + b", &request.model))
        }
    }

    #[tokio::test]
    async fn test_code_tasks_are_verified_off_the_runtime_thread() {
        let recorder = Arc::new(ThreadRecorder(Mutex::new(Vec::new())));
        let sampler = Sampler::new(
            Generator::new(GeneratorConfig::default()),
            AnswerNormalizer::new(recorder.clone()),
        );
        let task = Task::single(
            "p1",
            "write add",
            VerifierSpec::Python(CodeSpec {
                fn_name: "add".into(),
                tests: vec![CodeCase { input: vec![json!(1), json!(2)], output: json!(3) }],
            }),
        );
        let route = ModelRoute::new(ModelSpec::new("test", "m"), Arc::new(Answers));

        let outcome = sampler.sample(&task, &route, Strategy::BestOfN, 2, 0.7).await.unwrap();
        assert!(outcome.best.ok);
        assert_eq!(outcome.candidates.len(), 2);

        let threads = recorder.0.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != thread::current().id()));
    }

    #[test]
    fn test_freeform_canonical_is_trimmed_text() {
        let normalizer = AnswerNormalizer::default();
        let task = Task::new("f", "Say hi", TaskCheck::ExactMatch { answer: "hi".into() });
        let c = score_candidate(&normalizer, &task, "  hi \n".into(), "m", Usage::default());
        assert!(c.ok);
        assert_eq!(c.canonical.as_deref(), Some("hi"));
        assert_eq!(c.distance, 0.0);
    }
}
