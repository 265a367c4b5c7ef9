//! Serialized run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::Generation;
use crate::runner::Strategy;
use crate::verifiers::Diagnostics;

/// Token and cost totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    pub fn from_generation(generation: &Generation) -> Self {
        Self {
            input_tokens: generation.input_tokens as u64,
            output_tokens: generation.output_tokens as u64,
            cost_usd: generation.cost_usd,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost_usd += other.cost_usd;
    }
}

impl<'a> std::iter::Sum<&'a Usage> for Usage {
    fn sum<I: Iterator<Item = &'a Usage>>(iter: I) -> Self {
        iter.fold(Usage::default(), |mut acc, u| {
            acc.add(u);
            acc
        })
    }
}

/// One sampled response and its verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub ok: bool,
    pub score: f64,
    pub meta: Diagnostics,
    /// Lower is better; only meaningful among candidates of one task
    pub distance: f64,
    /// Grouping key for majority voting; `None` never joins a group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    /// `backend/model` that produced the text
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
}

/// Per-task record appended to `details.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub ok: bool,
    pub score: f64,
    pub meta: Diagnostics,
    pub text: String,
    pub strategy: Strategy,
    pub n: usize,
    pub model_used: String,
    /// Every candidate drawn for the chosen model, in draw order
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Usage across all candidates and fallback attempts
    #[serde(default)]
    pub usage: Usage,
}

/// Aggregate written once to `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub task_path: String,
    pub model_backend: String,
    pub model_name: String,
    pub strategy: Strategy,
    pub n: usize,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_notes: Option<String>,
    pub num_tasks: usize,
    pub num_correct: usize,
    pub accuracy: f64,
    pub duration_sec: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub total_output_tokens: u64,
    #[serde(default)]
    pub cancelled: bool,
}

impl RunSummary {
    /// `backend/model` label
    pub fn model_label(&self) -> String {
        format!("{}/{}", self.model_backend, self.model_name)
    }
}

/// Run settings written once to `run_config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub task_path: String,
    pub model: String,
    pub strategy: Strategy,
    pub n: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub json_mode: bool,
    #[serde(default)]
    pub fallback_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_notes: Option<String>,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Fraction of `ok` results; 0 for an empty run
pub fn accuracy(results: &[EvaluationResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let correct = results.iter().filter(|r| r.ok).count();
    correct as f64 / results.len() as f64
}
