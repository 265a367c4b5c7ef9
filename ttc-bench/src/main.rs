//! TTC Benchmark CLI

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ttc_bench::{
    config::Config,
    providers::ModelSpec,
    reporting::{print_console_report, write_comparison, write_run_report},
    runner::{Evaluator, RunOptions, Strategy},
    storage::{run_suffix, RunStore},
    tasks::{load_tasks_from_file, TaskCheck},
    verifiers::text::preview,
};

#[derive(Parser)]
#[command(name = "ttc-bench")]
#[command(about = "Test-time compute benchmark harness for language models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a model on a task file
    Run {
        /// Path to the JSONL task file
        #[arg(short, long)]
        task: PathBuf,

        /// Model as backend/name, e.g. ollama/llama3.2:1b-instruct
        #[arg(short, long)]
        model: ModelSpec,

        /// Sampling strategy
        #[arg(short, long, value_enum, default_value = "single")]
        strategy: Strategy,

        /// Samples per task for best_of_n and self_consistency
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        n: u64,

        /// Sampling temperature
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,

        /// Comma-separated fallback models tried in order when a task fails
        #[arg(long, value_delimiter = ',')]
        fallback: Vec<ModelSpec>,

        /// Ask the backend for JSON output
        #[arg(long)]
        json_mode: bool,

        /// Free-form notes stored with the run
        #[arg(long)]
        meta_notes: Option<String>,

        /// Directory holding run directories (default from config)
        #[arg(long)]
        run_root: Option<PathBuf>,

        /// Skip writing the HTML report
        #[arg(long)]
        no_report: bool,
    },

    /// Generate an HTML report for one run
    Report {
        /// Run directory containing summary.json and details.jsonl
        #[arg(short, long)]
        run_dir: PathBuf,

        /// Output file path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Compare all runs under a directory as Markdown
    Compare {
        /// Directory searched for summary.json files (default from config)
        #[arg(long)]
        runs_root: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Report title
        #[arg(long, default_value = "Neurometric TTC Comparison")]
        title: String,
    },

    /// List tasks in a task file
    ListTasks {
        /// Path to the JSONL task file
        #[arg(short, long)]
        task: PathBuf,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/ttc.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("ttc_bench=debug,info")
    } else {
        EnvFilter::new("ttc_bench=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run {
            task,
            model,
            strategy,
            n,
            temperature,
            fallback,
            json_mode,
            meta_notes,
            run_root,
            no_report,
        } => {
            let options = RunOptions::new(task.display().to_string(), model)
                .with_strategy(strategy, n as usize)
                .with_temperature(temperature)
                .with_fallback(fallback)
                .with_json_mode(json_mode)
                .with_meta_notes(meta_notes);
            run_benchmark(&config, &task, options, run_root, no_report).await?;
        }

        Commands::Report { run_dir, out } => {
            let out = out.unwrap_or_else(|| default_report_path(&config, &run_dir));
            write_run_report(&run_dir, &out)?;
            println!("Report written to: {}", out.display());
        }

        Commands::Compare {
            runs_root,
            out,
            title,
        } => {
            let runs_root = runs_root.unwrap_or_else(|| PathBuf::from(&config.benchmark.run_root));
            let out = out.unwrap_or_else(|| {
                PathBuf::from(&config.benchmark.report_dir).join("comparison.md")
            });
            let count = write_comparison(&runs_root, &out, &title)?;
            println!("Compared {} runs into: {}", count, out.display());
        }

        Commands::ListTasks { task } => {
            list_tasks(&task)?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

async fn run_benchmark(
    config: &Config,
    task_path: &Path,
    options: RunOptions,
    run_root: Option<PathBuf>,
    no_report: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let tasks = load_tasks_from_file(task_path)?;

    println!("=== TTC Benchmark ===");
    println!("Tasks: {} from {}", tasks.len(), task_path.display());
    println!("Model: {}", options.model);
    println!("Strategy: {} (n={})", options.strategy, options.n);
    println!();

    // Resolve every backend before creating any artifacts
    let cancel = Arc::new(AtomicBool::new(false));
    let evaluator = Evaluator::from_config(config, options)?.with_cancel_flag(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current task");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let run_root = run_root.unwrap_or_else(|| PathBuf::from(&config.benchmark.run_root));
    let mut store = RunStore::create(&run_root)?;
    let outcome = evaluator.run(&tasks, &mut store).await?;

    print_console_report(&outcome.summary, &outcome.results);
    println!("Run artifacts: {}", outcome.dir.display());

    if !no_report {
        let out = default_report_path(config, &outcome.dir);
        write_run_report(&outcome.dir, &out)?;
        println!("Report: {}", out.display());
    }

    Ok(())
}

fn default_report_path(config: &Config, run_dir: &Path) -> PathBuf {
    PathBuf::from(&config.benchmark.report_dir).join(format!("report_{}.html", run_suffix(run_dir)))
}

fn list_tasks(task_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let tasks = load_tasks_from_file(task_path)?;

    println!("Tasks ({}):", tasks.len());
    println!("{:-<60}", "");

    for task in &tasks {
        let kind = match (&task.kind, &task.check) {
            (Some(kind), _) => kind.as_str(),
            (None, TaskCheck::Chain(_)) => "chain",
            (None, _) => "freeform",
        };
        println!(
            "  {} | {} | {}",
            task.id,
            kind,
            preview(&task.prompt.replace('\n', " "), 60)
        );
    }

    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}
