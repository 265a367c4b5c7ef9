//! Answer verification
//!
//! Every verifier maps a candidate response and a [`VerifierSpec`] to a
//! [`Verdict`]. Verifiers never fail on malformed model output: parse and
//! execution problems are reported through [`Diagnostics::Failure`] with a
//! failing verdict.

pub mod code;
pub mod json;
pub mod normalize;
pub mod numeric;
pub mod pattern;
pub mod sandbox;
pub mod text;

pub use code::verify_code;
pub use json::{canonical_json, json_eq, verify_json};
pub use normalize::AnswerNormalizer;
pub use numeric::verify_numeric;
pub use pattern::verify_regex;
pub use sandbox::{CaseOutcome, CodeSandbox, PythonSandbox, SandboxError, SandboxReport};
pub use text::{extract_first_number, strip_code_markers};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Default absolute tolerance for numeric answers
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Outcome of verifying one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub score: f64,
    pub diagnostics: Diagnostics,
}

impl Verdict {
    /// Binary verdict: score 1.0 when passed, 0.0 otherwise
    pub fn binary(passed: bool, diagnostics: Diagnostics) -> Self {
        Self {
            passed,
            score: if passed { 1.0 } else { 0.0 },
            diagnostics,
        }
    }

    /// Guaranteed failure carrying an error tag
    pub fn failure(error: impl Into<String>, detail: Option<String>) -> Self {
        Self::binary(
            false,
            Diagnostics::Failure {
                error: error.into(),
                detail,
            },
        )
    }
}

/// Verifier-specific diagnostics attached to a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostics {
    Numeric {
        parsed: Option<f64>,
        abs_error: Option<f64>,
    },
    Json {
        diffs: IndexMap<String, KeyDiff>,
        candidate: Value,
    },
    Regex {
        #[serde(rename = "match")]
        matched: Option<String>,
    },
    Code {
        diffs: Vec<CaseDiff>,
    },
    ExactMatch,
    /// Diagnostics of each verifier run in a chain, keyed by verifier type
    Chain {
        steps: IndexMap<String, Diagnostics>,
    },
    Failure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Diagnostics {
    /// Parsed numeric value, when this came from the numeric verifier
    pub fn parsed_number(&self) -> Option<f64> {
        match self {
            Diagnostics::Numeric { parsed, .. } => *parsed,
            _ => None,
        }
    }

    pub fn abs_error(&self) -> Option<f64> {
        match self {
            Diagnostics::Numeric { abs_error, .. } => *abs_error,
            _ => None,
        }
    }

    /// Parsed candidate object, when this came from the JSON verifier
    pub fn parsed_json(&self) -> Option<&Value> {
        match self {
            Diagnostics::Json { candidate, .. } => Some(candidate),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Diagnostics::Failure { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Gold/candidate pair for a mismatched JSON key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDiff {
    pub gold: Value,
    #[serde(rename = "cand")]
    pub candidate: Value,
}

/// A failing test case of the code verifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDiff {
    pub input: Vec<Value>,
    pub expected: Value,
    pub got: Value,
}

/// One `{input, output}` case for the code verifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeCase {
    #[serde(default)]
    pub input: Vec<Value>,
    #[serde(default)]
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NumericSpec {
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub answer: f64,
    #[serde(default = "default_tolerance")]
    pub tol: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonSpec {
    pub answer: serde_json::Map<String, Value>,
    #[serde(default)]
    pub required_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegexSpec {
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeSpec {
    pub fn_name: String,
    #[serde(default)]
    pub tests: Vec<CodeCase>,
}

/// A verifier and its type-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub enum VerifierSpec {
    Numeric(NumericSpec),
    Json(JsonSpec),
    Regex(RegexSpec),
    Python(CodeSpec),
    /// A type tag no verifier is registered for
    Unknown(String),
}

impl VerifierSpec {
    /// Registered type tags, in dispatch order
    pub const KINDS: [&'static str; 4] = ["numeric", "json", "regex", "python"];

    /// Build a spec from its type tag and the object holding its fields.
    ///
    /// Unregistered tags produce [`VerifierSpec::Unknown`]; a registered tag
    /// whose required fields are missing is an error.
    pub fn from_tagged(kind: &str, fields: &Value) -> Result<Self, String> {
        let spec = match kind {
            "numeric" => VerifierSpec::Numeric(parse_fields(kind, fields)?),
            "json" => VerifierSpec::Json(parse_fields(kind, fields)?),
            "regex" => VerifierSpec::Regex(parse_fields(kind, fields)?),
            "python" => VerifierSpec::Python(parse_fields(kind, fields)?),
            other => VerifierSpec::Unknown(other.to_string()),
        };
        Ok(spec)
    }

    /// Build a spec from a `{type, ...}` object
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or("verifier is missing a string `type`")?;
        Self::from_tagged(kind, value)
    }

    pub fn kind(&self) -> &str {
        match self {
            VerifierSpec::Numeric(_) => "numeric",
            VerifierSpec::Json(_) => "json",
            VerifierSpec::Regex(_) => "regex",
            VerifierSpec::Python(_) => "python",
            VerifierSpec::Unknown(kind) => kind,
        }
    }
}

fn parse_fields<T: serde::de::DeserializeOwned>(kind: &str, fields: &Value) -> Result<T, String> {
    serde_json::from_value(fields.clone()).map_err(|e| format!("invalid {} verifier: {}", kind, e))
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("answer is not representable as f64")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("answer `{}` is not numeric", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}
