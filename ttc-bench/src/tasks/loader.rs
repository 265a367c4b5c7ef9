//! Task loading from newline-delimited JSON

use std::path::Path;

use serde_json::Value;

use super::{Task, TaskCheck};
use crate::verifiers::VerifierSpec;

/// Error type for task loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid task on line {line}: {message}")]
    InvalidTask { line: usize, message: String },
}

/// Load tasks from a JSONL file
pub fn load_tasks_from_file(path: impl AsRef<Path>) -> Result<Vec<Task>, LoadError> {
    let content = std::fs::read_to_string(path)?;
    load_tasks_from_str(&content)
}

/// Load tasks from JSONL text, one object per non-empty line.
///
/// Tasks without an `id` are named `item_<n>` by their 1-based position
/// among the loaded tasks.
pub fn load_tasks_from_str(content: &str) -> Result<Vec<Task>, LoadError> {
    let mut tasks = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_idx + 1;

        let value: Value = serde_json::from_str(line).map_err(|e| LoadError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;

        let task = parse_task(&value, tasks.len() + 1).map_err(|message| LoadError::InvalidTask {
            line: line_no,
            message,
        })?;
        tasks.push(task);
    }

    tracing::debug!("Loaded {} tasks", tasks.len());
    Ok(tasks)
}

/// Parse a single task object
fn parse_task(value: &Value, position: usize) -> Result<Task, String> {
    let obj = value.as_object().ok_or("task must be a JSON object")?;

    let id = match obj.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        None | Some(Value::Null) => format!("item_{}", position),
        Some(other) => return Err(format!("unsupported id {}", other)),
    };

    let prompt = obj
        .get("prompt")
        .and_then(Value::as_str)
        .ok_or("missing string `prompt`")?
        .to_string();

    let kind = match obj.get("type") {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => None,
        Some(other) => return Err(format!("`type` must be a string, got {}", other)),
    };

    let check = match obj.get("verifiers") {
        Some(Value::Array(entries)) => {
            let specs = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    VerifierSpec::from_value(entry).map_err(|e| format!("verifiers[{}]: {}", i, e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            TaskCheck::Chain(specs)
        }
        Some(Value::Null) | None => legacy_check(kind.as_deref(), value)?,
        Some(other) => return Err(format!("`verifiers` must be an array, got {}", other)),
    };

    Ok(Task {
        id,
        kind,
        prompt,
        schema: obj.get("schema").cloned(),
        check,
    })
}

/// Check derived from the single-type fields when no chain is given.
///
/// Registered types get their verifier. Any other type with a gold answer is
/// checked by exact match; without one it stays [`VerifierSpec::Unknown`] and
/// fails at verification time.
fn legacy_check(kind: Option<&str>, value: &Value) -> Result<TaskCheck, String> {
    if let Some(kind) = kind.filter(|k| VerifierSpec::KINDS.iter().any(|known| *known == *k)) {
        return VerifierSpec::from_tagged(kind, value).map(TaskCheck::Single);
    }

    let answer = match value.get("answer") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    match (answer, kind) {
        (Some(answer), _) => Ok(TaskCheck::ExactMatch { answer }),
        (None, None | Some("freeform")) => Err("exact-match task requires `answer`".to_string()),
        (None, Some(kind)) => Ok(TaskCheck::Single(VerifierSpec::Unknown(kind.to_string()))),
    }
}
