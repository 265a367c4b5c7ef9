//! Dispatch of raw responses to verifiers

use std::sync::Arc;

use indexmap::IndexMap;

use super::sandbox::{CodeSandbox, PythonSandbox};
use super::{
    verify_code, verify_json, verify_numeric, verify_regex, Diagnostics, Verdict, VerifierSpec,
};
use crate::tasks::{Task, TaskCheck};

/// Routes a response to the verifiers its task asks for
#[derive(Clone)]
pub struct AnswerNormalizer {
    sandbox: Arc<dyn CodeSandbox>,
}

impl AnswerNormalizer {
    pub fn new(sandbox: Arc<dyn CodeSandbox>) -> Self {
        Self { sandbox }
    }

    /// Verify `text` against `task`.
    ///
    /// Chains run in order and stop at the first failing verifier, which fails
    /// the whole task with score 0.0; a fully passing chain scores 1.0.
    pub fn normalize(&self, task: &Task, text: &str) -> Verdict {
        match &task.check {
            TaskCheck::Chain(specs) => self.run_chain(specs, text),
            TaskCheck::Single(VerifierSpec::Unknown(kind)) => {
                Verdict::failure(format!("unknown_task_type_{}", kind), None)
            }
            TaskCheck::Single(spec) => self.run_spec(spec, text),
            TaskCheck::ExactMatch { answer } => {
                Verdict::binary(text.trim() == answer.trim(), Diagnostics::ExactMatch)
            }
        }
    }

    /// Run one verifier
    pub fn run_spec(&self, spec: &VerifierSpec, text: &str) -> Verdict {
        match spec {
            VerifierSpec::Numeric(s) => verify_numeric(text, s.answer, s.tol),
            VerifierSpec::Json(s) => verify_json(text, &s.answer, s.required_keys.as_deref()),
            VerifierSpec::Regex(s) => verify_regex(Some(text), &s.pattern),
            VerifierSpec::Python(s) => verify_code(text, s, self.sandbox.as_ref()),
            VerifierSpec::Unknown(kind) => Verdict::failure(format!("unknown_verifier_{}", kind), None),
        }
    }

    fn run_chain(&self, specs: &[VerifierSpec], text: &str) -> Verdict {
        let mut steps = IndexMap::new();
        for spec in specs {
            let verdict = self.run_spec(spec, text);
            steps.insert(spec.kind().to_string(), verdict.diagnostics);
            if !verdict.passed {
                return Verdict::binary(false, Diagnostics::Chain { steps });
            }
        }
        Verdict::binary(true, Diagnostics::Chain { steps })
    }
}

impl Default for AnswerNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(PythonSandbox::default()))
    }
}

impl std::fmt::Debug for AnswerNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerNormalizer").finish_non_exhaustive()
    }
}
