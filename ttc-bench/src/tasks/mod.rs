//! Task definitions and loading

pub mod loader;
pub mod prompt;

pub use loader::{load_tasks_from_file, load_tasks_from_str, LoadError};
pub use prompt::build_prompt;

use serde_json::Value;

use crate::verifiers::VerifierSpec;

/// How a task decides whether a response is correct
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCheck {
    /// Ordered verifiers; the first failure fails the task
    Chain(Vec<VerifierSpec>),
    /// One verifier selected by the task's declared type
    Single(VerifierSpec),
    /// Trimmed response must equal the trimmed gold answer
    ExactMatch { answer: String },
}

/// One evaluation item
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    /// Declared `type`, as written in the task file
    pub kind: Option<String>,
    pub prompt: String,
    /// Schema hint shown to the model for JSON tasks
    pub schema: Option<Value>,
    pub check: TaskCheck,
}

impl Task {
    /// Create a task with no declared type
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, check: TaskCheck) -> Self {
        Self {
            id: id.into(),
            kind: None,
            prompt: prompt.into(),
            schema: None,
            check,
        }
    }

    /// Create a task checked by a single verifier, declaring its type
    pub fn single(id: impl Into<String>, prompt: impl Into<String>, spec: VerifierSpec) -> Self {
        let kind = spec.kind().to_string();
        Self::new(id, prompt, TaskCheck::Single(spec)).with_kind(kind)
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Whether answers are numeric, which changes candidate ranking and grouping
    pub fn is_numeric(&self) -> bool {
        matches!(self.check, TaskCheck::Single(VerifierSpec::Numeric(_)))
    }

    /// Whether answers are JSON objects
    pub fn is_json(&self) -> bool {
        matches!(self.check, TaskCheck::Single(VerifierSpec::Json(_)))
    }

    /// Whether checking a response executes it in a child process
    pub fn runs_code(&self) -> bool {
        let is_code = |spec: &VerifierSpec| matches!(spec, VerifierSpec::Python(_));
        match &self.check {
            TaskCheck::Single(spec) => is_code(spec),
            TaskCheck::Chain(specs) => specs.iter().any(is_code),
            TaskCheck::ExactMatch { .. } => false,
        }
    }
}
