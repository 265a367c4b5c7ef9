//! Results reporting

pub mod html;
pub mod markdown;

pub use html::{render_run_report, write_run_report};
pub use markdown::{efficiency_crossover, render_comparison, write_comparison};

use crate::storage::{EvaluationResult, RunSummary};

/// Generate a console report for one run
pub fn print_console_report(summary: &RunSummary, results: &[EvaluationResult]) {
    println!("\n=== TTC Benchmark Results ===\n");
    println!("Task File:    {}", summary.task_path);
    println!("Model:        {}", summary.model_label());
    if let Some(fallback) = &summary.fallback_models {
        println!("Fallback:     {}", fallback.join(", "));
    }
    println!("Strategy:     {} (n={})", summary.strategy, summary.n);
    println!("Temperature:  {}", summary.temperature);
    println!(
        "Accuracy:     {:.2}% ({}/{})",
        summary.accuracy * 100.0,
        summary.num_correct,
        summary.num_tasks
    );
    println!("Duration:     {:.1}s", summary.duration_sec);
    if summary.total_cost_usd > 0.0 {
        println!(
            "Cost:         ${:.4} ({} in / {} out tokens)",
            summary.total_cost_usd, summary.total_input_tokens, summary.total_output_tokens
        );
    }
    if summary.cancelled {
        println!("Status:       cancelled");
    }

    let failed: Vec<_> = results.iter().filter(|r| !r.ok).collect();
    if !failed.is_empty() {
        println!("\nFailed Tasks:");
        println!("{:-<50}", "");
        for result in failed {
            let reason = result.meta.error().unwrap_or("wrong answer");
            println!(
                "  {} [{}] score {:.2} via {}: {}",
                result.task_id,
                result.kind.as_deref().unwrap_or("freeform"),
                result.score,
                result.model_used,
                reason
            );
        }
    }

    println!("\n{:=<50}", "");
}
