//! Out-of-process execution of model-generated code
//!
//! Candidate code never runs inside the harness. [`PythonSandbox`] starts a
//! fresh interpreter per candidate in isolated mode, with an empty
//! environment, a throwaway working directory and a wall-clock limit. It does
//! not restrict filesystem or network access; run the harness under an
//! unprivileged account or container when evaluating untrusted models.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CodeCase;
use crate::config::SandboxConfig;

/// Outcome reported by a sandbox run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SandboxReport {
    /// Loading the code raised
    ExecError { detail: String },
    /// No callable with the requested name after loading
    FunctionNotFound,
    /// A call raised; remaining cases were not run
    RuntimeError { detail: String },
    /// Every case ran
    Completed { cases: Vec<CaseOutcome> },
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub passed: bool,
    #[serde(default)]
    pub got: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to start sandbox: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("sandbox timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("sandbox produced no usable report: {0}")]
    Protocol(String),
}

/// Executes candidate code against test cases in isolation
pub trait CodeSandbox: Send + Sync {
    fn execute(
        &self,
        code: &str,
        fn_name: &str,
        cases: &[CodeCase],
    ) -> Result<SandboxReport, SandboxError>;
}

/// Harness run by the child interpreter. Reads `{code, fn_name, cases}` on
/// stdin and writes exactly one report object to the original stdout; the
/// candidate's own prints are diverted to stderr.
const PYTHON_HARNESS: &str = r#"
import json, sys
payload = json.load(sys.stdin)
report_out = sys.stdout
sys.stdout = sys.stderr

def emit(obj):
    report_out.write(json.dumps(obj, default=repr, allow_nan=False))
    report_out.flush()
    sys.exit(0)

def portable(value):
    try:
        json.dumps(value, default=repr, allow_nan=False)
        return value
    except ValueError:
        return repr(value)

namespace = {"__name__": "candidate"}
try:
    exec(payload["code"], namespace)
except BaseException as e:
    emit({"status": "exec_error", "detail": repr(e)})

fn = namespace.get(payload["fn_name"])
if not callable(fn):
    emit({"status": "function_not_found"})

cases = []
for case in payload["cases"]:
    try:
        got = fn(*case.get("input", []))
    except BaseException as e:
        emit({"status": "runtime_error", "detail": repr(e)})
    cases.append({"passed": got == case.get("output"), "got": portable(got)})
emit({"status": "completed", "cases": cases})
"#;

#[derive(Serialize)]
struct Payload<'a> {
    code: &'a str,
    fn_name: &'a str,
    cases: &'a [CodeCase],
}

/// Grace period for collecting pipe output once the process group is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Reads a pipe to completion on its own thread. The receiver is never
/// waited on without a timeout, so a descendant holding the pipe open
/// cannot stall the caller.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// SIGKILLs every process in the group led by `pgid`. Errors mean the group
/// is already gone.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    // SAFETY: killpg takes no pointers; an unknown group yields ESRCH
    unsafe {
        libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Runs Python candidates in a child interpreter
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: PathBuf,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(interpreter: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(&config.python, Duration::from_millis(config.timeout_ms))
    }
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl CodeSandbox for PythonSandbox {
    fn execute(
        &self,
        code: &str,
        fn_name: &str,
        cases: &[CodeCase],
    ) -> Result<SandboxReport, SandboxError> {
        let payload = serde_json::to_vec(&Payload {
            code,
            fn_name,
            cases,
        })
        .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        let workdir = tempfile::TempDir::new()?;
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-I")
            .arg("-c")
            .arg(PYTHON_HARNESS)
            .current_dir(workdir.path())
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Only PATH survives, for interpreter lookup
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        // Own process group, so anything the candidate spawns dies with it
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn()?;
        let pgid = child.id();

        let stdout_rx = child.stdout.take().map(drain);
        let stderr_rx = child.stderr.take().map(drain);

        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit before reading all of it
            let _ = stdin.write_all(&payload);
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                kill_process_group(pgid);
                let _ = child.kill();
                let _ = child.wait();
                return Err(SandboxError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
        // Background processes left behind still hold the pipes
        kill_process_group(pgid);

        let collect = |rx: Option<mpsc::Receiver<String>>| {
            rx.and_then(|rx| rx.recv_timeout(DRAIN_TIMEOUT).ok())
                .unwrap_or_default()
        };
        let stdout = collect(stdout_rx);
        let stderr = collect(stderr_rx);

        serde_json::from_str(stdout.trim()).map_err(|e| {
            let tail: String = stderr.chars().rev().take(300).collect::<Vec<_>>().into_iter().rev().collect();
            SandboxError::Protocol(format!("{} (stderr: {})", e, tail.trim()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_wire_format() {
        let report: SandboxReport = serde_json::from_str(
            r#"{"status": "completed", "cases": [{"passed": true, "got": 3}, {"passed": false, "got": null}]}"#,
        )
        .unwrap();
        assert_eq!(
            report,
            SandboxReport::Completed {
                cases: vec![
                    CaseOutcome { passed: true, got: json!(3) },
                    CaseOutcome { passed: false, got: Value::Null },
                ]
            }
        );

        let report: SandboxReport = serde_json::from_str(r#"{"status": "function_not_found"}"#).unwrap();
        assert_eq!(report, SandboxReport::FunctionNotFound);
    }

    #[test]
    fn test_missing_interpreter_is_spawn_error() {
        let sandbox = PythonSandbox::new("/nonexistent/python-for-tests", Duration::from_secs(1));
        let err = sandbox.execute("def f(): pass", "f", &[]).unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(_)));
    }

    /// A sandbox on the host's python3, or None when there is no interpreter
    fn python3(timeout: Duration) -> Option<PythonSandbox> {
        let found = Command::new("python3")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        if !found {
            eprintln!("python3 not available; skipping");
            return None;
        }
        Some(PythonSandbox::new("python3", timeout))
    }

    fn add_cases() -> Vec<CodeCase> {
        vec![
            CodeCase { input: vec![json!(1), json!(2)], output: json!(3) },
            CodeCase { input: vec![json!(2), json!(2)], output: json!(5) },
        ]
    }

    #[test]
    fn test_python_reports_each_case() {
        let Some(sandbox) = python3(Duration::from_secs(10)) else { return };
        let report = sandbox
            .execute("def add(a, b):\n    return a + b\n", "add", &add_cases())
            .unwrap();
        assert_eq!(
            report,
            SandboxReport::Completed {
                cases: vec![
                    CaseOutcome { passed: true, got: json!(3) },
                    CaseOutcome { passed: false, got: json!(4) },
                ]
            }
        );
    }

    #[test]
    fn test_python_syntax_error() {
        let Some(sandbox) = python3(Duration::from_secs(10)) else { return };
        let report = sandbox.execute("def add(a, b) return a", "add", &add_cases()).unwrap();
        match report {
            SandboxReport::ExecError { detail } => assert!(detail.contains("SyntaxError")),
            other => panic!("expected exec_error, got {:?}", other),
        }
    }

    #[test]
    fn test_python_function_not_found() {
        let Some(sandbox) = python3(Duration::from_secs(10)) else { return };
        let report = sandbox.execute("add = 3\n", "add", &add_cases()).unwrap();
        assert_eq!(report, SandboxReport::FunctionNotFound);
        let report = sandbox.execute("def plus(a, b): return a + b\n", "add", &add_cases()).unwrap();
        assert_eq!(report, SandboxReport::FunctionNotFound);
    }

    #[test]
    fn test_python_runtime_error_stops_remaining_cases() {
        let Some(sandbox) = python3(Duration::from_secs(10)) else { return };
        let code = "def add(a, b):\n    return a / 0\n";
        match sandbox.execute(code, "add", &add_cases()).unwrap() {
            SandboxReport::RuntimeError { detail } => assert!(detail.contains("ZeroDivisionError")),
            other => panic!("expected runtime_error, got {:?}", other),
        }
    }

    #[test]
    fn test_python_prints_do_not_corrupt_report() {
        let Some(sandbox) = python3(Duration::from_secs(10)) else { return };
        let code = "def add(a, b):\n    for i in range(20000):\n        print('noise', i)\n    return a + b\n";
        let report = sandbox.execute(code, "add", &add_cases()).unwrap();
        assert!(matches!(report, SandboxReport::Completed { ref cases } if cases[0].passed));
    }

    #[test]
    fn test_python_infinite_loop_times_out() {
        let Some(sandbox) = python3(Duration::from_millis(500)) else { return };
        let started = Instant::now();
        let err = sandbox
            .execute("def add(a, b):\n    while True:\n        pass\n", "add", &add_cases())
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { timeout_ms: 500 }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_python_background_process_does_not_hold_run() {
        let Some(sandbox) = python3(Duration::from_millis(1500)) else { return };
        let code = "import subprocess\nsubprocess.Popen(['sleep', '30'])\ndef add(a, b):\n    return a + b\n";
        let started = Instant::now();
        let report = sandbox.execute(code, "add", &add_cases()).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
        assert!(matches!(report, SandboxReport::Completed { ref cases } if cases[0].passed));
    }

    #[cfg(unix)]
    #[test]
    fn test_python_background_process_killed_on_timeout() {
        let Some(sandbox) = python3(Duration::from_millis(500)) else { return };
        let code = "import subprocess, time\nsubprocess.Popen(['sleep', '30'])\ntime.sleep(30)\ndef add(a, b):\n    return a + b\n";
        let started = Instant::now();
        let err = sandbox.execute(code, "add", &add_cases()).unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_python_non_finite_result_is_a_failed_case() {
        let Some(sandbox) = python3(Duration::from_secs(10)) else { return };
        let code = "def add(a, b):\n    return [float('nan'), float('inf')] if a == 1 else float('nan')\n";
        let report = sandbox.execute(code, "add", &add_cases()).unwrap();
        assert_eq!(
            report,
            SandboxReport::Completed {
                cases: vec![
                    CaseOutcome { passed: false, got: json!("[nan, inf]") },
                    CaseOutcome { passed: false, got: json!("nan") },
                ]
            }
        );
    }
}
