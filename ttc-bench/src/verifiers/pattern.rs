//! Regular-expression verifier

use regex::Regex;

use super::{Diagnostics, Verdict};

/// Pass when `pattern` matches anywhere in the candidate.
///
/// An absent candidate is searched as the empty string. A pattern that does
/// not compile fails the candidate with an `invalid_pattern` diagnostic.
pub fn verify_regex(candidate: Option<&str>, pattern: &str) -> Verdict {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => return Verdict::failure("invalid_pattern", Some(e.to_string())),
    };

    let matched = re
        .find(candidate.unwrap_or(""))
        .map(|m| m.as_str().to_string());

    Verdict::binary(matched.is_some(), Diagnostics::Regex { matched })
}
