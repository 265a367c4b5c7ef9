//! Numeric answer verifier

use super::text::extract_first_number;
use super::{Diagnostics, Verdict};

/// Compare the first number in `candidate` with `gold` under an absolute
/// tolerance. Scoring is binary; a near miss earns nothing.
pub fn verify_numeric(candidate: &str, gold: f64, tol: f64) -> Verdict {
    let Some(parsed) = extract_first_number(Some(candidate)) else {
        return Verdict::binary(
            false,
            Diagnostics::Numeric {
                parsed: None,
                abs_error: None,
            },
        );
    };

    let abs_error = (parsed - gold).abs();
    Verdict::binary(
        abs_error <= tol,
        Diagnostics::Numeric {
            parsed: Some(parsed),
            abs_error: Some(abs_error),
        },
    )
}
