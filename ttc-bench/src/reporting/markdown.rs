//! Markdown comparison across runs

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::Local;

use crate::storage::{find_summaries, RunSummary, StoreError};

/// Where a small model with test-time compute catches up with a larger one
#[derive(Debug, Clone, PartialEq)]
pub struct Crossover {
    /// Smallest `n` at which the small model reaches the baseline
    pub n: usize,
    pub cost_usd: f64,
    /// Best single-shot accuracy of the large model
    pub baseline_accuracy: f64,
}

/// Find the smallest `n` at which a "1b" model matches the best "7b"
/// single-shot accuracy, if both kinds of run exist.
pub fn efficiency_crossover(runs: &[RunSummary]) -> Option<Crossover> {
    let baseline = runs
        .iter()
        .filter(|r| r.model_name.to_lowercase().contains("7b") && r.n == 1)
        .map(|r| r.accuracy)
        .max_by(|a, b| a.total_cmp(b))?;

    let mut small: Vec<&RunSummary> = runs
        .iter()
        .filter(|r| r.model_name.to_lowercase().contains("1b"))
        .collect();
    small.sort_by_key(|r| r.n);

    small
        .into_iter()
        .find(|r| r.accuracy >= baseline)
        .map(|r| Crossover {
            n: r.n,
            cost_usd: r.total_cost_usd,
            baseline_accuracy: baseline,
        })
}

/// Render a comparison of `runs` as Markdown
pub fn render_comparison(title: &str, runs: &[RunSummary]) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", title);
    let _ = writeln!(md, "Generated: {}\n", Local::now().format("%Y-%m-%dT%H:%M:%S"));

    if runs.is_empty() {
        let _ = writeln!(md, "No completed runs found.");
        return md;
    }

    let mut sorted: Vec<&RunSummary> = runs.iter().collect();
    sorted.sort_by(|a, b| a.model_name.cmp(&b.model_name).then(a.n.cmp(&b.n)));

    let _ = writeln!(md, "## Runs\n");
    let _ = writeln!(md, "| Model | Strategy | N | Tasks | Accuracy | Duration (s) | Cost (USD) |");
    let _ = writeln!(md, "|---|---|---|---|---|---|---|");
    for run in &sorted {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {:.2}% | {:.1} | {:.4} |",
            run.model_label(),
            run.strategy,
            run.n,
            run.num_tasks,
            run.accuracy * 100.0,
            run.duration_sec,
            run.total_cost_usd
        );
    }

    let mut by_model: BTreeMap<&str, Vec<&RunSummary>> = BTreeMap::new();
    for run in &sorted {
        by_model.entry(run.model_name.as_str()).or_default().push(run);
    }

    let _ = writeln!(md, "\n## Accuracy vs N\n");
    for (model, items) in &by_model {
        let series: Vec<String> = items
            .iter()
            .map(|r| format!("n={}: {:.2}%", r.n, r.accuracy * 100.0))
            .collect();
        let _ = writeln!(md, "- **{}**: {}", model, series.join(", "));
    }

    let _ = writeln!(md, "\n## Latency vs N\n");
    for (model, items) in &by_model {
        let series: Vec<String> = items
            .iter()
            .map(|r| format!("n={}: {:.1}s", r.n, r.duration_sec))
            .collect();
        let _ = writeln!(md, "- **{}**: {}", model, series.join(", "));
    }

    let _ = writeln!(md, "\n## Efficiency\n");
    match efficiency_crossover(runs) {
        Some(c) => {
            let _ = writeln!(
                md,
                "1B+TTC matches 7B single-shot accuracy ({:.2}%) at N={} (cost ~ ${:.2}).",
                c.baseline_accuracy * 100.0,
                c.n,
                c.cost_usd
            );
        }
        None => {
            let _ = writeln!(md, "No 1B run reached the 7B single-shot baseline.");
        }
    }

    md
}

/// Compare every run under `runs_root` and write the Markdown to `out`.
/// Returns the number of runs compared.
pub fn write_comparison(
    runs_root: impl AsRef<Path>,
    out: impl AsRef<Path>,
    title: &str,
) -> Result<usize, StoreError> {
    let runs: Vec<RunSummary> = find_summaries(runs_root)?
        .into_iter()
        .map(|(_, summary)| summary)
        .collect();
    let md = render_comparison(title, &runs);

    let out = out.as_ref();
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(out, md).map_err(|e| StoreError::Io {
        path: out.to_path_buf(),
        source: e,
    })?;
    tracing::info!("Compared {} runs into {}", runs.len(), out.display());
    Ok(runs.len())
}
