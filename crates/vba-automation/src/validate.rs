//! Edit-pipeline pre-validation (C11 step 1): character-set restriction and
//! structural block-balance checking.
use crate::error::{AutomationError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// A non-ASCII character found during pre-validation, with enough context
/// to build the canned replacement-table message.
#[derive(Debug, Clone)]
pub struct NonAsciiOffense {
    /// 1-based line number.
    pub line: usize,
    /// The offending character.
    pub ch: char,
}

/// A small, canned suggestion table for characters that commonly slip into
/// macro source from a rich-text editor.
fn suggest_replacement(ch: char) -> Option<&'static str> {
    match ch {
        '\u{2018}' | '\u{2019}' => Some("'"),
        '\u{201c}' | '\u{201d}' => Some("\""),
        '\u{2013}' | '\u{2014}' => Some("-"),
        '\u{2026}' => Some("..."),
        '\u{00a0}' => Some(" "),
        _ => None,
    }
}

/// Rejects a module body containing any character with codepoint > 127;
/// this format does not carry a declared encoding for source and the
/// downstream host rejects non-ASCII.
pub fn validate_ascii(body: &str) -> Result<()> {
    let offenses: Vec<NonAsciiOffense> = body
        .lines()
        .enumerate()
        .flat_map(|(i, line)| {
            line.chars()
                .filter(|c| !c.is_ascii())
                .map(move |ch| NonAsciiOffense { line: i + 1, ch })
        })
        .collect();
    if offenses.is_empty() {
        return Ok(());
    }
    let detail = offenses
        .iter()
        .map(|o| match suggest_replacement(o.ch) {
            Some(repl) => format!("line {}: '{}' (U+{:04X}) -> \"{repl}\"", o.line, o.ch, o.ch as u32),
            None => format!("line {}: '{}' (U+{:04X})", o.line, o.ch, o.ch as u32),
        })
        .collect::<Vec<_>>()
        .join(", ");
    Err(AutomationError::Validation(format!(
        "non-ASCII characters found: {detail}"
    )))
}

/// An unmatched opener/closer pair count for one block keyword family.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockImbalance {
    /// e.g. `"If"`.
    pub keyword: &'static str,
    /// Opener occurrences minus closer occurrences (can be negative-like in
    /// meaning but is reported unsigned with a sign elsewhere).
    pub openers: usize,
    /// Closer occurrences.
    pub closers: usize,
}

static BLOCK_PATTERNS: Lazy<Vec<(&'static str, Regex, Regex)>> = Lazy::new(|| {
    vec![
        ("If", Regex::new(r"(?i)^\s*If\b.*\bThen\s*$").unwrap(), Regex::new(r"(?i)^\s*End\s+If\s*$").unwrap()),
        ("For", Regex::new(r"(?i)^\s*For\b").unwrap(), Regex::new(r"(?i)^\s*Next\b").unwrap()),
        ("While", Regex::new(r"(?i)^\s*While\b").unwrap(), Regex::new(r"(?i)^\s*Wend\s*$").unwrap()),
        ("Do", Regex::new(r"(?i)^\s*Do\b").unwrap(), Regex::new(r"(?i)^\s*Loop\b").unwrap()),
        ("With", Regex::new(r"(?i)^\s*With\b").unwrap(), Regex::new(r"(?i)^\s*End\s+With\s*$").unwrap()),
        ("Select", Regex::new(r"(?i)^\s*Select\s+Case\b").unwrap(), Regex::new(r"(?i)^\s*End\s+Select\s*$").unwrap()),
        ("Sub", Regex::new(r"(?i)^\s*(Public\s+|Private\s+|Friend\s+)?(Static\s+)?Sub\b").unwrap(), Regex::new(r"(?i)^\s*End\s+Sub\s*$").unwrap()),
        ("Function", Regex::new(r"(?i)^\s*(Public\s+|Private\s+|Friend\s+)?(Static\s+)?Function\b").unwrap(), Regex::new(r"(?i)^\s*End\s+Function\s*$").unwrap()),
    ]
});

/// Counts openers and closers for `If`/`For`/`While`/`Do`/`With`/`Select`/
/// `Sub`/`Function`; any imbalance is an error.
pub fn check_block_balance(body: &str) -> Result<()> {
    let mut imbalances = Vec::new();
    for (keyword, opener, closer) in BLOCK_PATTERNS.iter() {
        let openers = body.lines().filter(|l| opener.is_match(l)).count();
        let closers = body.lines().filter(|l| closer.is_match(l)).count();
        if openers != closers {
            imbalances.push(BlockImbalance {
                keyword,
                openers,
                closers,
            });
        }
    }
    if imbalances.is_empty() {
        return Ok(());
    }
    let detail = imbalances
        .iter()
        .map(|i| format!("{} ({} opener(s), {} closer(s))", i.keyword, i.openers, i.closers))
        .collect::<Vec<_>>()
        .join(", ");
    Err(AutomationError::Validation(format!(
        "unbalanced blocks: {detail}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_balanced_ascii_body() {
        let body = "Public Sub X()\n    If True Then\n        MsgBox \"ok\"\n    End If\nEnd Sub";
        assert!(validate_ascii(body).is_ok());
        assert!(check_block_balance(body).is_ok());
    }

    #[test]
    fn rejects_unclosed_if() {
        let body = "Public Sub X()\n    If True Then\n        MsgBox \"x\"\nEnd Sub";
        let err = check_block_balance(body).unwrap_err();
        assert!(matches!(err, AutomationError::Validation(_)));
    }

    #[test]
    fn rejects_non_ascii_with_line_number() {
        let err = validate_ascii("MsgBox \"\u{2713}\"").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 1"));
    }
}
