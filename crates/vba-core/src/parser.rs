//! Source parser (C5): a line-oriented scanner that recovers procedure
//! boundaries, signatures and call-target identifiers from decoded module
//! text, without attempting a full grammar.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// A procedure's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcKind {
    /// `Sub`.
    Sub,
    /// `Function`.
    Function,
    /// `Property Get`.
    PropertyGet,
    /// `Property Let`.
    PropertyLet,
    /// `Property Set`.
    PropertySet,
}

/// A procedure's declared visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// `Public`, or no explicit modifier (VBA defaults to public).
    Public,
    /// `Private`.
    Private,
    /// `Friend`.
    Friend,
}

/// A named, ordered span inside a module.
#[derive(Debug, Clone)]
pub struct Procedure {
    /// The procedure name, with its original casing preserved.
    pub name: String,
    /// Sub/Function/PropertyGet/Let/Set.
    pub kind: ProcKind,
    /// Public/Private/Friend.
    pub visibility: Visibility,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    /// Every identifier immediately followed by `(` within the span, minus
    /// the keyword denylist, sorted.
    pub calls: Vec<String>,
    /// Cyclomatic complexity, computed over the same span (see
    /// [`crate::complexity`]).
    pub complexity: u32,
}

static OPENER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<vis>Public\s+|Private\s+|Friend\s+)?(?P<static>Static\s+)?(?P<kind>Sub|Function|Property\s+(Get|Let|Set))\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(",
    )
    .unwrap()
});

static CLOSER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*End\s+(Sub|Function|Property)\s*$").unwrap());

static CALL_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

/// Paren-less call statements (`DoWork 1, 2`): an identifier starting a
/// line, followed by at least one argument, with no parens and no `=`
/// (which would make it an assignment rather than a call).
static STATEMENT_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*([A-Za-z_][A-Za-z0-9_]*)\s+[^=\s]").unwrap());

/// Identifiers that precede `(` syntactically (keywords, declarations,
/// visibility modifiers, built-ins) but are never call targets. This is the
/// single source of truth for call-target filtering across the crate.
const CALL_DENYLIST: &[&str] = &[
    "if", "elseif", "end", "for", "each", "next", "while", "wend", "do", "loop", "until", "case",
    "select", "with", "sub", "function", "property", "get", "let", "set", "public", "private",
    "friend", "static", "dim", "as", "new", "call", "return", "exit", "goto", "on", "error",
    "resume", "option", "explicit", "compare", "database", "binary", "text", "true", "false",
    "nothing", "null", "empty", "me", "is", "like", "mod", "not", "and", "or", "xor", "eqv",
    "imp", "byval", "byref", "optional", "paramarray", "const", "type", "enum", "declare", "lib",
    "alias", "event", "raiseevent", "implements", "withevents", "attribute", "then", "else",
];

/// Parses procedures out of decoded module source text. Line indexing is
/// 1-based; a final opener with no matching closer closes at the module's
/// last line.
pub fn parse_procedures(code: &str) -> Vec<Procedure> {
    let lines: Vec<&str> = code.lines().collect();
    let mut procedures = Vec::new();
    let mut i = 0usize;
    while i < lines.len() {
        if let Some(caps) = OPENER.captures(lines[i]) {
            let start_line = i + 1;
            let kind = match caps
                .name("kind")
                .unwrap()
                .as_str()
                .split_whitespace()
                .collect::<Vec<_>>()
                .as_slice()
            {
                [k] if k.eq_ignore_ascii_case("sub") => ProcKind::Sub,
                [k] if k.eq_ignore_ascii_case("function") => ProcKind::Function,
                [_, accessor] if accessor.eq_ignore_ascii_case("get") => ProcKind::PropertyGet,
                [_, accessor] if accessor.eq_ignore_ascii_case("let") => ProcKind::PropertyLet,
                [_, accessor] if accessor.eq_ignore_ascii_case("set") => ProcKind::PropertySet,
                _ => ProcKind::Sub,
            };
            let visibility = match caps.name("vis").map(|m| m.as_str().trim().to_ascii_lowercase()) {
                Some(v) if v == "private" => Visibility::Private,
                Some(v) if v == "friend" => Visibility::Friend,
                _ => Visibility::Public,
            };
            let name = caps.name("name").unwrap().as_str().to_string();

            let mut end_line = lines.len();
            let mut closer_found = false;
            let mut j = i + 1;
            while j < lines.len() {
                if CLOSER.is_match(lines[j]) {
                    end_line = j + 1;
                    closer_found = true;
                    break;
                }
                j += 1;
            }

            let full_span = lines[i..end_line.min(lines.len())].join("\n");
            // Body only, excluding the declaration line itself, so a
            // procedure's own name (e.g. `Function HelloWorld(`) is never
            // self-captured as a call target.
            let body_start = (i + 1).min(lines.len());
            let body_end = if closer_found {
                (end_line - 1).max(body_start)
            } else {
                lines.len()
            };
            let body_span = lines[body_start..body_end].join("\n");
            let calls = extract_call_targets(&body_span);
            let complexity = crate::complexity::score(&full_span);

            procedures.push(Procedure {
                name,
                kind,
                visibility,
                start_line,
                end_line,
                calls,
                complexity,
            });
            i = end_line;
        } else {
            i += 1;
        }
    }
    procedures
}

/// Collects every identifier immediately followed by `(` in `span`, plus
/// every paren-less call statement's leading identifier, minus the keyword
/// denylist, sorted and deduplicated.
pub fn extract_call_targets(span: &str) -> Vec<String> {
    let mut set: BTreeSet<String> = BTreeSet::new();
    for caps in CALL_TARGET.captures_iter(span) {
        let ident = &caps[1];
        if !CALL_DENYLIST.contains(&ident.to_ascii_lowercase().as_str()) {
            set.insert(ident.to_string());
        }
    }
    for caps in STATEMENT_CALL.captures_iter(span) {
        let ident = &caps[1];
        if !CALL_DENYLIST.contains(&ident.to_ascii_lowercase().as_str()) {
            set.insert(ident.to_string());
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Public Function HelloWorld() As String\n    HelloWorld = \"Hello from VBA!\"\nEnd Function";

    #[test]
    fn parses_the_seed_scenario_module() {
        let procs = parse_procedures(SAMPLE);
        assert_eq!(procs.len(), 1);
        let p = &procs[0];
        assert_eq!(p.name, "HelloWorld");
        assert_eq!(p.kind, ProcKind::Function);
        assert_eq!(p.visibility, Visibility::Public);
        assert_eq!(p.complexity, 1);
        assert!(p.calls.is_empty());
    }

    #[test]
    fn unterminated_opener_closes_at_end_of_module() {
        let code = "Private Sub Broken()\n    DoSomething\n";
        let procs = parse_procedures(code);
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].end_line, 2);
        assert_eq!(procs[0].visibility, Visibility::Private);
    }

    #[test]
    fn call_targets_exclude_denylisted_keywords() {
        let calls = extract_call_targets("If Foo() Then\n    Bar(1)\nEnd If");
        assert_eq!(calls, vec!["Bar".to_string(), "Foo".to_string()]);
    }
}
