//! Text extraction helpers shared by the verifiers

use std::sync::OnceLock;

use regex::Regex;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"))
}

/// Extract the first signed decimal numeral from `text`.
///
/// Thousands separators are removed before searching, so `"1,234.5"` yields
/// `1234.5`. Returns `None` when the input is absent, holds no numeral, or
/// the numeral overflows `f64`.
pub fn extract_first_number(text: Option<&str>) -> Option<f64> {
    let text = text?;
    let cleaned = text.replace(',', "");
    let found = number_pattern().find(&cleaned)?;
    found.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Remove a surrounding triple-backtick fence and an optional `json` tag.
///
/// Text that does not start with a fence is returned trimmed but otherwise
/// unchanged.
pub fn strip_code_markers(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let inner = trimmed.trim_matches('`').trim();
    match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => inner[4..].trim(),
        _ => inner,
    }
}

/// Clip `text` to at most `max_chars` characters for previews and logs.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// First `max_chars` characters of `text`, without an ellipsis
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
