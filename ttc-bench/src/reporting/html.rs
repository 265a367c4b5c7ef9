//! HTML report for a single run

use std::fmt::Write as _;
use std::path::Path;

use chrono::Local;

use crate::storage::{
    load_config, load_details, load_summary, EvaluationResult, RunConfig, RunSummary, StoreError,
};
use crate::verifiers::text::clip;

/// Characters of serialized diagnostics shown per row
const META_PREVIEW: usize = 200;

const STYLE: &str = "body { font-family: -apple-system, BlinkMacSystemFont, Segoe UI, Roboto, Arial, sans-serif; margin: 40px; }
    h1, h2 { margin: 0.2em 0; }
    table { border-collapse: collapse; width: 100%; margin-top: 1em; }
    th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
    th { background: #f7f7f7; }
    code { background: #f2f2f2; padding: 2px 4px; border-radius: 3px; }
    .ok { color: #0a7d00; font-weight: 600; }
    .bad { color: #b00020; font-weight: 600; }";

/// Escape text for HTML element and attribute content
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the report for a run. The settings table is omitted when the run
/// has no saved configuration.
pub fn render_run_report(
    summary: &RunSummary,
    config: Option<&RunConfig>,
    results: &[EvaluationResult],
) -> String {
    let mut html = String::new();
    let _ = writeln!(html, "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">");
    let _ = writeln!(html, "  <title>Neurometric TTC Benchmark Report</title>");
    let _ = writeln!(html, "  <style>\n    {}\n  </style>\n</head>\n<body>", STYLE);
    let _ = writeln!(html, "  <h1>Neurometric TTC Benchmark Report</h1>");
    let _ = writeln!(
        html,
        "  <p><strong>Generated:</strong> {}</p>",
        Local::now().format("%Y-%m-%dT%H:%M:%S")
    );

    let _ = writeln!(html, "  <h2>Summary</h2>\n  <table>");
    let rows = [
        ("Task File", escape(&summary.task_path)),
        (
            "Model",
            format!("{} / {}", escape(&summary.model_backend), escape(&summary.model_name)),
        ),
        ("Strategy", summary.strategy.to_string()),
        ("N", summary.n.to_string()),
        ("Temperature", summary.temperature.to_string()),
        ("Num Tasks", summary.num_tasks.to_string()),
        ("Accuracy", format!("{:.2}%", summary.accuracy * 100.0)),
        ("Duration (s)", format!("{:.1}", summary.duration_sec)),
        ("Cost (USD)", format!("{:.4}", summary.total_cost_usd)),
    ];
    for (label, value) in rows {
        let _ = writeln!(html, "    <tr><th>{}</th><td>{}</td></tr>", label, value);
    }
    if let Some(fallback) = &summary.fallback_models {
        let _ = writeln!(
            html,
            "    <tr><th>Fallback Models</th><td>{}</td></tr>",
            escape(&fallback.join(", "))
        );
    }
    if let Some(notes) = &summary.meta_notes {
        let _ = writeln!(html, "    <tr><th>Notes</th><td>{}</td></tr>", escape(notes));
    }
    let _ = writeln!(html, "  </table>");

    if let Some(config) = config {
        let _ = writeln!(html, "  <h2>Settings</h2>\n  <table>");
        let rows = [
            ("Top P", config.top_p.to_string()),
            ("JSON Mode", config.json_mode.to_string()),
            ("Request Timeout (ms)", config.timeout_ms.to_string()),
            ("Retries", config.retry_count.to_string()),
            ("Created", config.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        ];
        for (label, value) in rows {
            let _ = writeln!(html, "    <tr><th>{}</th><td>{}</td></tr>", label, value);
        }
        let _ = writeln!(html, "  </table>");
    }

    let _ = writeln!(html, "  <h2>Details</h2>\n  <table>");
    let _ = writeln!(
        html,
        "    <tr><th>#</th><th>Task ID</th><th>Type</th><th>OK?</th><th>Score</th><th>Meta</th></tr>"
    );
    for (i, result) in results.iter().enumerate() {
        let class = if result.ok { "ok" } else { "bad" };
        let meta = serde_json::to_string(&result.meta).unwrap_or_default();
        let _ = writeln!(
            html,
            "    <tr><td>{}</td><td>{}</td><td>{}</td><td class='{}'>{}</td><td>{:.2}</td><td><code>{}</code></td></tr>",
            i + 1,
            escape(&result.task_id),
            escape(result.kind.as_deref().unwrap_or("")),
            class,
            result.ok,
            result.score,
            escape(clip(&meta, META_PREVIEW))
        );
    }
    let _ = writeln!(html, "  </table>\n</body>\n</html>");
    html
}

/// Render the report for the run stored in `run_dir` and write it to `out`
pub fn write_run_report(run_dir: impl AsRef<Path>, out: impl AsRef<Path>) -> Result<(), StoreError> {
    let run_dir = run_dir.as_ref();
    let summary = load_summary(run_dir)?;
    let config = match load_config(run_dir) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::debug!("No run configuration for report: {}", e);
            None
        }
    };
    let results = load_details(run_dir)?;
    let html = render_run_report(&summary, config.as_ref(), &results);

    let out = out.as_ref();
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(out, html).map_err(|e| StoreError::Io {
        path: out.to_path_buf(),
        source: e,
    })?;
    tracing::info!("Wrote HTML report to {}", out.display());
    Ok(())
}
