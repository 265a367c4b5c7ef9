//! End-to-end evaluation tests
//!
//! Drive the evaluator with scripted in-process providers and check the
//! records, summaries, and strategy choices it produces.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ttc_bench::prelude::*;
use ttc_bench::runner::{Generator, GeneratorConfig};
use ttc_bench::storage::{load_details, load_summary, SUMMARY_FILE};
use ttc_bench::tasks::{load_tasks_from_str, TaskCheck};
use ttc_bench::verifiers::Diagnostics;

const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(FIXTURES_DIR).join(name)
}

/// Replays a fixed list of responses, cycling when exhausted
struct Scripted {
    responses: Vec<String>,
    queue: Mutex<VecDeque<String>>,
}

impl Scripted {
    fn new(responses: &[&str]) -> Arc<Self> {
        let responses: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
        Arc::new(Self {
            queue: Mutex::new(responses.iter().cloned().collect()),
            responses,
        })
    }
}

#[async_trait]
impl LLMProvider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Generation> {
        let mut queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            queue.extend(self.responses.iter().cloned());
        }
        let text = queue.pop_front().unwrap_or_default();
        Ok(Generation {
            text,
            model: request.model.clone(),
            input_tokens: 3,
            output_tokens: 1,
            cost_usd: 0.0,
            latency_ms: 0,
        })
    }
}

/// Fails every call as an unreachable backend would
struct Unreachable;

#[async_trait]
impl LLMProvider for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn default_model(&self) -> &str {
        "none"
    }

    async fn generate(&self, _request: &GenerationRequest) -> ProviderResult<Generation> {
        Err(ProviderError::Config("backend is not running".into()))
    }
}

fn route(model: &str, provider: Arc<dyn LLMProvider>) -> ModelRoute {
    ModelRoute::new(ModelSpec::new("mock", model), provider)
}

fn evaluator(routes: Vec<ModelRoute>, strategy: Strategy, n: usize) -> Evaluator {
    let generator = Generator::new(GeneratorConfig {
        retry_count: 0,
        ..GeneratorConfig::default()
    });
    let options = RunOptions::new("inline", routes[0].spec.clone())
        .with_strategy(strategy, n)
        .with_temperature(0.7)
        .with_fallback(routes.iter().skip(1).map(|r| r.spec.clone()).collect());
    Evaluator::new(Sampler::new(generator, AnswerNormalizer::default()), routes, options)
}

fn numeric_task() -> Task {
    load_tasks_from_str(r#"{"id":"t1","type":"numeric","prompt":"2+2?","answer":4,"tol":0.01}"#)
        .unwrap()
        .remove(0)
}

fn freeform_task(answer: &str) -> Task {
    Task::new("f1", "Pick a letter", TaskCheck::ExactMatch { answer: answer.to_string() })
}

// =============================================================================
// Single-shot scoring
// =============================================================================

#[tokio::test]
async fn test_numeric_answer_in_prose() {
    let eval = evaluator(vec![route("m", Scripted::new(&["The answer is 4.0"]))], Strategy::Single, 1);
    let result = eval.evaluate_task(&numeric_task()).await.unwrap();

    assert!(result.ok);
    assert_eq!(result.score, 1.0);
    assert_eq!(
        result.meta,
        Diagnostics::Numeric {
            parsed: Some(4.0),
            abs_error: Some(0.0)
        }
    );
    assert_eq!(result.model_used, "mock/m");
    assert_eq!(result.usage.input_tokens, 3);
}

#[tokio::test]
async fn test_chain_passes_when_every_verifier_passes() {
    let task = load_tasks_from_str(
        r#"{"id":"c1","prompt":"Say OK and the number five","verifiers":[{"type":"regex","pattern":"^OK"},{"type":"numeric","answer":5}]}"#,
    )
    .unwrap()
    .remove(0);
    let eval = evaluator(vec![route("m", Scripted::new(&["OK 5"]))], Strategy::Single, 1);
    let result = eval.evaluate_task(&task).await.unwrap();

    assert!(result.ok);
    assert_eq!(result.score, 1.0);
    match result.meta {
        Diagnostics::Chain { steps } => {
            let kinds: Vec<&str> = steps.keys().map(String::as_str).collect();
            assert_eq!(kinds, vec!["regex", "numeric"]);
            assert_eq!(steps["numeric"].parsed_number(), Some(5.0));
        }
        other => panic!("expected chain diagnostics, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_task_type_fails_without_aborting() {
    let task = load_tasks_from_str(r#"{"id":"u1","type":"haiku","prompt":"Write one"}"#)
        .unwrap()
        .remove(0);
    let eval = evaluator(vec![route("m", Scripted::new(&["an old pond"]))], Strategy::Single, 1);
    let result = eval.evaluate_task(&task).await.unwrap();

    assert!(!result.ok);
    assert_eq!(result.meta.error(), Some("unknown_task_type_haiku"));
    assert_eq!(result.kind.as_deref(), Some("haiku"));
}

#[tokio::test]
async fn test_unknown_task_type_with_answer_uses_exact_match() {
    let task = load_tasks_from_str(r#"{"id":"u2","type":"haiku","prompt":"p","answer":"x"}"#)
        .unwrap()
        .remove(0);
    let eval = evaluator(vec![route("m", Scripted::new(&[" x\n"]))], Strategy::Single, 1);
    let result = eval.evaluate_task(&task).await.unwrap();

    assert!(result.ok);
    assert_eq!(result.score, 1.0);
    assert_eq!(result.meta, Diagnostics::ExactMatch);
    assert_eq!(result.kind.as_deref(), Some("haiku"));
}

#[test]
fn test_json_fence_does_not_change_verdict() {
    let task = load_tasks_from_str(
        r#"{"id":"j1","type":"json","prompt":"city","answer":{"city":"Paris","pop":2}}"#,
    )
    .unwrap()
    .remove(0);
    let normalizer = AnswerNormalizer::default();

    for body in [r#"{"city": "Paris", "pop": 2}"#, r#"{"city": "Lyon", "pop": 2}"#, "nope"] {
        let plain = normalizer.normalize(&task, body);
        let fenced = normalizer.normalize(&task, &format!("```json\n{}\n```", body));
        assert_eq!(plain, fenced, "verdict changed for {}", body);
    }
}

// =============================================================================
// Sampling strategies
// =============================================================================

#[tokio::test]
async fn test_best_of_one_matches_single() {
    let responses = ["The answer is 3.9"];
    let single = evaluator(vec![route("m", Scripted::new(&responses))], Strategy::Single, 1)
        .evaluate_task(&numeric_task())
        .await
        .unwrap();
    let best = evaluator(vec![route("m", Scripted::new(&responses))], Strategy::BestOfN, 1)
        .evaluate_task(&numeric_task())
        .await
        .unwrap();

    assert_eq!(single.ok, best.ok);
    assert_eq!(single.score, best.score);
    assert_eq!(single.text, best.text);
    assert_eq!(single.meta, best.meta);
    assert_eq!(best.candidates.len(), 1);
}

#[tokio::test]
async fn test_best_of_n_prefers_closest_numeric_answer() {
    let provider = Scripted::new(&["It is 7", "It is 4.5", "It is 4.001", "none"]);
    let result = evaluator(vec![route("m", provider)], Strategy::BestOfN, 4)
        .evaluate_task(&numeric_task())
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.text, "It is 4.001");
    assert_eq!(result.candidates.len(), 4);
    assert_eq!(result.usage.input_tokens, 12);
}

#[tokio::test]
async fn test_self_consistency_takes_majority() {
    let provider = Scripted::new(&["b", "a", "b", "a", "a"]);
    let result = evaluator(vec![route("m", provider)], Strategy::SelfConsistency, 5)
        .evaluate_task(&freeform_task("b"))
        .await
        .unwrap();

    // The majority answer wins even though it is wrong
    assert_eq!(result.text, "a");
    assert!(!result.ok);
    let chosen = result
        .candidates
        .iter()
        .find(|c| c.text == result.text)
        .and_then(|c| c.canonical.as_deref());
    assert_eq!(chosen, Some("a"));
}

#[tokio::test]
async fn test_self_consistency_groups_numbers_by_value() {
    let provider = Scripted::new(&["5", "four: 4", "It's 4.0", "6"]);
    let result = evaluator(vec![route("m", provider)], Strategy::SelfConsistency, 4)
        .evaluate_task(&numeric_task())
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.meta.parsed_number(), Some(4.0));
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn test_fallback_advances_to_succeeding_model() {
    let routes = vec![
        route("m1", Scripted::new(&["It is 5"])),
        route("m2", Scripted::new(&["It is 4"])),
    ];
    let result = evaluator(routes, Strategy::Single, 1)
        .evaluate_task(&numeric_task())
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.model_used, "mock/m2");
    assert_eq!(result.usage.input_tokens, 6);
}

#[tokio::test]
async fn test_fallback_returns_last_attempt_when_all_fail() {
    let routes = vec![
        route("m1", Scripted::new(&["It is 4.02"])),
        route("m2", Scripted::new(&["It is 9"])),
    ];
    let result = evaluator(routes, Strategy::Single, 1)
        .evaluate_task(&numeric_task())
        .await
        .unwrap();

    assert!(!result.ok);
    assert_eq!(result.model_used, "mock/m2");
    assert_eq!(result.text, "It is 9");
}

#[tokio::test]
async fn test_fallback_skips_unreachable_backend() {
    let routes = vec![
        route("down", Arc::new(Unreachable)),
        route("up", Scripted::new(&["4"])),
    ];
    let result = evaluator(routes, Strategy::BestOfN, 3)
        .evaluate_task(&numeric_task())
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.model_used, "mock/up");
}

// =============================================================================
// Full runs
// =============================================================================

#[tokio::test]
async fn test_run_over_fixture_file() {
    let tasks = load_tasks_from_file(fixture("mixed.jsonl")).unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[2].id, "item_3");

    // t1 right, t2 right, item_3 wrong
    let provider = Scripted::new(&["4", "```json\n{\"city\": \"Paris\"}\n```", "goodbye"]);
    let root = tempfile::tempdir().unwrap();
    let mut store = RunStore::create(root.path()).unwrap();
    let outcome = evaluator(vec![route("m", provider)], Strategy::Single, 1)
        .run(&tasks, &mut store)
        .await
        .unwrap();

    assert_eq!(outcome.summary.num_tasks, 3);
    assert_eq!(outcome.summary.accuracy, 2.0 / 3.0);
    assert_eq!(outcome.summary.total_input_tokens, 9);

    let logged = load_details(&outcome.dir).unwrap();
    let ids: Vec<&str> = logged.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2", "item_3"]);
    assert_eq!(load_summary(&outcome.dir).unwrap().accuracy, 2.0 / 3.0);
    assert!(outcome.dir.join("run_config.json").exists());
}

#[tokio::test]
async fn test_generation_failure_without_fallback_is_fatal() {
    let tasks = vec![numeric_task()];
    let root = tempfile::tempdir().unwrap();
    let mut store = RunStore::create(root.path()).unwrap();
    let err = evaluator(vec![route("down", Arc::new(Unreachable))], Strategy::Single, 1)
        .run(&tasks, &mut store)
        .await
        .unwrap_err();

    assert!(matches!(err, EvalError::Provider(ProviderError::Config(_))));
    assert!(!store.dir().join(SUMMARY_FILE).exists());
}
