//! Intent confidence scoring
//!
//! Confidence is additive: each catalog regex that matches adds
//! [`REGEX_MATCH_WEIGHT`], a satisfied required-token predicate adds
//! [`REQUIRED_TOKENS_BONUS`], and the presence of any field token adds
//! [`FIELD_BONUS`]. The sum is clamped to [`MAX_CONFIDENCE`]. A pattern
//! whose regexes all miss is not scored at all.
//!
//! The constants are heuristics; they are kept stable so results do not
//! drift between releases.

use crate::intent::DetectedIntent;
use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Scoring Constants
// ---------------------------------------------------------------------------

/// Added for every pattern regex matching the raw or normalized input.
pub const REGEX_MATCH_WEIGHT: f64 = 0.4;

/// Added when the pattern's required-token predicate holds.
pub const REQUIRED_TOKENS_BONUS: f64 = 0.2;

/// Added when the input mentions any known field.
pub const FIELD_BONUS: f64 = 0.2;

/// Upper clamp.
pub const MAX_CONFIDENCE: f64 = 1.0;

/// A catalog winner below this falls through to the custom-formula path,
/// and the converter refuses to produce a formula below it by default.
pub const MIN_INTENT_CONFIDENCE: f64 = 0.3;

/// `detect_all` drops candidates at or below this.
pub const SUGGESTION_FLOOR: f64 = 0.1;

/// Custom formula wrapping operands in `SUM(...)` / `AVERAGE(...)`.
pub const CUSTOM_CALL_CONFIDENCE: f64 = 0.5;

/// Custom formula joining operands with `+ - * /`.
pub const CUSTOM_INFIX_CONFIDENCE: f64 = 0.5;

/// Custom formula for any other operation, `OP(...)`.
pub const CUSTOM_GENERIC_CONFIDENCE: f64 = 0.4;

/// Nothing usable was extracted.
pub const UNKNOWN_CONFIDENCE: f64 = 0.2;

// ---------------------------------------------------------------------------
// Scoring Functions
// ---------------------------------------------------------------------------

/// Score one catalog pattern. Returns `None` when no regex matched.
pub fn score_pattern(matched_regexes: usize, required_tokens_ok: bool, has_field: bool) -> Option<f64> {
    if matched_regexes == 0 {
        return None;
    }

    let mut confidence = matched_regexes as f64 * REGEX_MATCH_WEIGHT;
    if required_tokens_ok {
        confidence += REQUIRED_TOKENS_BONUS;
    }
    if has_field {
        confidence += FIELD_BONUS;
    }

    Some(confidence.clamp(0.0, MAX_CONFIDENCE))
}

/// Sort descending by confidence. Stable, so equal scores keep catalog order.
pub fn sort_by_confidence(intents: &mut [DetectedIntent]) {
    intents.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
}
