//! Executable-code verifier

use super::sandbox::{CodeSandbox, SandboxError, SandboxReport};
use super::{CaseDiff, CodeSpec, Diagnostics, Verdict};

/// Run the candidate's `spec.fn_name` against each test case in `sandbox`.
///
/// Passes only when the function exists and every case returns its expected
/// output. A load or call failure ends evaluation of this candidate with a
/// zero score.
pub fn verify_code(candidate: &str, spec: &CodeSpec, sandbox: &dyn CodeSandbox) -> Verdict {
    let report = match sandbox.execute(candidate, &spec.fn_name, &spec.tests) {
        Ok(report) => report,
        Err(SandboxError::Timeout { timeout_ms }) => {
            tracing::warn!("Code candidate for {} timed out after {}ms", spec.fn_name, timeout_ms);
            return Verdict::failure("sandbox_timeout", Some(format!("{}ms", timeout_ms)));
        }
        Err(e) => {
            tracing::warn!("Sandbox failure while checking {}: {}", spec.fn_name, e);
            return Verdict::failure("sandbox_error", Some(e.to_string()));
        }
    };

    let outcomes = match report {
        SandboxReport::ExecError { detail } => return Verdict::failure("exec_error", Some(detail)),
        SandboxReport::FunctionNotFound => return Verdict::failure("function_not_found", None),
        SandboxReport::RuntimeError { detail } => {
            return Verdict::failure("runtime_error", Some(detail))
        }
        SandboxReport::Completed { cases } => cases,
    };

    let mut passed = 0usize;
    let mut diffs = Vec::new();
    for (case, outcome) in spec.tests.iter().zip(&outcomes) {
        if outcome.passed {
            passed += 1;
        } else {
            diffs.push(CaseDiff {
                input: case.input.clone(),
                expected: case.output.clone(),
                got: outcome.got.clone(),
            });
        }
    }

    let total = spec.tests.len();
    let ok = passed == total;
    let score = if ok {
        1.0
    } else {
        passed as f64 / total.max(1) as f64
    };

    Verdict {
        passed: ok,
        score,
        diagnostics: Diagnostics::Code { diffs },
    }
}
