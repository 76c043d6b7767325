//! Keyword-based confidence scoring.
//!
//! A trigger hits when it occurs (case-insensitively) anywhere in the request.
//! Base confidence by hit count: 1 -> 65, 2 -> 80, 3+ -> 90. A coverage bonus
//! of `hits / min(triggers, 5) * 10` is added and the total is capped at 98.
//! Zero hits always score 0.

/// Confidence ceiling for keyword scoring.
pub const MAX_KEYWORD_CONFIDENCE: f64 = 98.0;

/// Triggers beyond this count do not dilute the coverage bonus.
const COVERAGE_WINDOW: usize = 5;

/// Outcome of scoring one trigger list against a request.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub confidence: f64,
    /// Triggers that hit, in declaration order.
    pub matched: Vec<String>,
}

/// Score `request` against `triggers`.
///
/// Empty triggers are ignored and duplicate triggers (case-insensitive) are
/// counted once.
pub fn keyword_match(triggers: &[String], request: &str) -> KeywordMatch {
    let haystack = request.to_lowercase();

    let mut seen: Vec<String> = Vec::new();
    let mut matched = Vec::new();
    for trigger in triggers {
        let needle = trigger.trim().to_lowercase();
        if needle.is_empty() || seen.contains(&needle) {
            continue;
        }
        if haystack.contains(&needle) {
            matched.push(trigger.clone());
        }
        seen.push(needle);
    }

    KeywordMatch {
        confidence: confidence_for_hits(matched.len(), seen.len()),
        matched,
    }
}

/// Convenience wrapper returning only the confidence.
pub fn keyword_confidence(triggers: &[String], request: &str) -> f64 {
    keyword_match(triggers, request).confidence
}

/// Confidence for `hits` matches out of `total` distinct triggers.
pub fn confidence_for_hits(hits: usize, total: usize) -> f64 {
    if hits == 0 || total == 0 {
        return 0.0;
    }

    let base = match hits {
        1 => 65.0,
        2 => 80.0,
        _ => 90.0,
    };
    let coverage = hits as f64 / total.min(COVERAGE_WINDOW) as f64 * 10.0;

    (base + coverage).min(MAX_KEYWORD_CONFIDENCE)
}
