//! Run artifacts on disk
//!
//! Each run owns a directory `run_YYYYmmdd_HHMMSS` under the run root with
//! an append-only `details.jsonl`, plus `summary.json` and `run_config.json`
//! snapshots written when the run ends.

pub mod records;

pub use records::{accuracy, Candidate, EvaluationResult, RunConfig, RunSummary, Usage};

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const DETAILS_FILE: &str = "details.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";
pub const CONFIG_FILE: &str = "run_config.json";

/// Errors reading or writing run artifacts
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writer for one run directory
pub struct RunStore {
    dir: PathBuf,
    details_path: PathBuf,
    details: BufWriter<File>,
}

impl RunStore {
    /// Create a fresh, uniquely named run directory under `run_root`
    pub fn create(run_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let run_root = run_root.as_ref();
        fs::create_dir_all(run_root).map_err(|e| StoreError::io(run_root, e))?;

        let base = format!("run_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let mut dir = run_root.join(&base);
        let mut attempt = 0;
        loop {
            match fs::create_dir(&dir) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    dir = run_root.join(format!("{}_{}", base, attempt));
                }
                Err(e) => return Err(StoreError::io(&dir, e)),
            }
        }

        let details_path = dir.join(DETAILS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&details_path)
            .map_err(|e| StoreError::io(&details_path, e))?;

        tracing::info!("Writing run artifacts to {}", dir.display());
        Ok(Self {
            dir,
            details_path,
            details: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one record and flush it to disk
    pub fn append(&mut self, result: &EvaluationResult) -> Result<(), StoreError> {
        serde_json::to_writer(&mut self.details, result)
            .map_err(|e| StoreError::json(&self.details_path, e))?;
        self.details
            .write_all(b"\n")
            .and_then(|_| self.details.flush())
            .map_err(|e| StoreError::io(&self.details_path, e))
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<(), StoreError> {
        write_pretty(&self.dir.join(SUMMARY_FILE), summary)
    }

    pub fn write_config(&self, config: &RunConfig) -> Result<(), StoreError> {
        write_pretty(&self.dir.join(CONFIG_FILE), config)
    }
}

/// Name of a run directory without the `run_` prefix
pub fn run_suffix(dir: &Path) -> String {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_prefix("run_").map(str::to_string).unwrap_or(name)
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::json(path, e))?;
    fs::write(path, json).map_err(|e| StoreError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| StoreError::json(path, e))
}

pub fn load_summary(run_dir: impl AsRef<Path>) -> Result<RunSummary, StoreError> {
    read_json(&run_dir.as_ref().join(SUMMARY_FILE))
}

pub fn load_config(run_dir: impl AsRef<Path>) -> Result<RunConfig, StoreError> {
    read_json(&run_dir.as_ref().join(CONFIG_FILE))
}

/// Read every record of a run's log, skipping blank lines
pub fn load_details(run_dir: impl AsRef<Path>) -> Result<Vec<EvaluationResult>, StoreError> {
    let path = run_dir.as_ref().join(DETAILS_FILE);
    let file = File::open(&path).map_err(|e| StoreError::io(&path, e))?;

    let mut results = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| StoreError::io(&path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        results.push(serde_json::from_str(&line).map_err(|e| StoreError::json(&path, e))?);
    }
    Ok(results)
}

/// Summaries of every completed run below `runs_root`, with their directories
pub fn find_summaries(runs_root: impl AsRef<Path>) -> Result<Vec<(PathBuf, RunSummary)>, StoreError> {
    let runs_root = runs_root.as_ref();
    let mut found = Vec::new();
    collect_summaries(runs_root, &mut found)?;
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

fn collect_summaries(dir: &Path, found: &mut Vec<(PathBuf, RunSummary)>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        if path.is_dir() {
            collect_summaries(&path, found)?;
        } else if path.file_name().is_some_and(|n| n == SUMMARY_FILE) {
            match read_json::<RunSummary>(&path) {
                Ok(summary) => {
                    let run_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    found.push((run_dir, summary));
                }
                Err(e) => tracing::warn!("Skipping unreadable summary: {}", e),
            }
        }
    }
    Ok(())
}
