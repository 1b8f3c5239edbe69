//! Complexity scorer (C6): cyclomatic complexity over a procedure's source
//! span.
use once_cell::sync::Lazy;
use regex::Regex;

/// Decision keywords that each contribute one point. `Case Else` is excluded
/// by `DECISION` itself matching `Case` but not when immediately followed by
/// `Else` on the same occurrence — handled by [`score`] via a dedicated
/// negative lookahead-free scan.
const DECISION_KEYWORDS: &[&str] = &["If", "ElseIf", "For", "While", "Do", "Case", "And", "Or"];

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = DECISION_KEYWORDS.join("|");
    Regex::new(&format!(r"(?i)\b({alternation})\b")).unwrap()
});

static CASE_ELSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bCase\s+Else\b").unwrap());

/// Computes `1 + (decision keyword occurrences)` over `span`, with
/// `Case Else` excluded from the `Case` count.
pub fn score(span: &str) -> u32 {
    let case_else_count = CASE_ELSE.find_iter(span).count() as u32;
    let keyword_count = WORD_PATTERN.find_iter(span).count() as u32;
    1 + keyword_count.saturating_sub(case_else_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_span_with_no_decisions_scores_one() {
        assert_eq!(score("x = 1\ny = 2"), 1);
    }

    #[test]
    fn counts_short_circuit_operators_inside_compound_conditions() {
        let span = "If a And b Or c Then\n    DoStuff\nEnd If";
        // whole-word "If" occurs twice (the opener and "End If"), And once, Or once
        assert_eq!(score(span), 5);
    }

    #[test]
    fn case_else_does_not_count_as_a_decision() {
        let span = "Select Case x\nCase 1\n    A\nCase Else\n    B\nEnd Select";
        // "Case" occurs 3 times, one of which is "Case Else" and is excluded
        assert_eq!(score(span), 3);
    }
}
