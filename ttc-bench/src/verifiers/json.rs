//! Structured JSON answer verifier

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::text::strip_code_markers;
use super::{Diagnostics, KeyDiff, Verdict};

/// Check a JSON candidate against `gold` over `required_keys`, or over every
/// gold key when none are given.
///
/// The score is the fraction of matching keys; the verdict passes only when
/// all of them match.
pub fn verify_json(
    candidate: &str,
    gold: &Map<String, Value>,
    required_keys: Option<&[String]>,
) -> Verdict {
    let object = match parse_candidate(candidate) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Verdict::failure("json_not_object", None),
        Err(error) => return Verdict::failure(error, None),
    };

    let keys: Vec<&str> = match required_keys {
        Some(keys) if !keys.is_empty() => keys.iter().map(String::as_str).collect(),
        _ => gold.keys().map(String::as_str).collect(),
    };

    let mut diffs = IndexMap::new();
    for key in &keys {
        let gold_value = gold.get(*key).unwrap_or(&Value::Null);
        let cand_value = object.get(*key).unwrap_or(&Value::Null);
        if !json_eq(gold_value, cand_value) {
            diffs.insert(
                key.to_string(),
                KeyDiff {
                    gold: gold_value.clone(),
                    candidate: cand_value.clone(),
                },
            );
        }
    }

    let total = keys.len();
    let correct = total - diffs.len();
    let passed = correct == total;
    let score = if passed {
        1.0
    } else {
        correct as f64 / total.max(1) as f64
    };

    Verdict {
        passed,
        score,
        diagnostics: Diagnostics::Json {
            diffs,
            candidate: Value::Object(object),
        },
    }
}

/// Parse fenced or embedded JSON, falling back to the outermost `{...}` span.
fn parse_candidate(candidate: &str) -> Result<Value, &'static str> {
    let stripped = strip_code_markers(candidate);
    if let Ok(value) = serde_json::from_str(stripped) {
        return Ok(value);
    }

    match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&stripped[start..=end]).map_err(|_| "json_parse_error")
        }
        _ => Err("json_not_found"),
    }
}

/// Value equality where numbers compare by magnitude, so `1` equals `1.0`.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Deterministic deep serialization used as a majority-vote key.
///
/// Object keys are sorted at every depth, array order is kept, and numbers
/// with an integral value print without a fraction so that `2` and `2.0`
/// land in the same group, matching [`json_eq`].
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => out.push_str(&format!("{}", f as i64)),
            _ => out.push_str(&n.to_string()),
        },
        other => out.push_str(&other.to_string()),
    }
}
