//! Refactor advisor (C8): rule-based suggestions over parsed procedures,
//! ranked by severity.
use crate::parser::Procedure;

/// A suggestion's severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Cosmetic; doesn't affect correctness or maintainability much.
    Low,
    /// Worth addressing.
    Medium,
    /// Should be addressed.
    High,
}

/// The rule family that produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Procedure complexity thresholds.
    Complexity,
    /// Procedure naming conventions.
    Naming,
    /// Procedure size/structure.
    Structure,
}

impl Family {
    /// Parses a filter token (`"complexity"`, `"naming"`, `"structure"`, or
    /// `"all"`) into the set of families it selects. Unknown tokens select
    /// nothing.
    pub fn matching(filter: &str) -> Vec<Family> {
        match filter.to_ascii_lowercase().as_str() {
            "all" => vec![Family::Complexity, Family::Naming, Family::Structure],
            "complexity" => vec![Family::Complexity],
            "naming" => vec![Family::Naming],
            "structure" => vec![Family::Structure],
            _ => vec![],
        }
    }
}

/// One rule-based suggestion against a specific module/procedure.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The module the procedure lives in.
    pub module_name: String,
    /// The procedure the suggestion is about.
    pub procedure_name: String,
    /// Which rule family produced it.
    pub family: Family,
    /// How urgent it is.
    pub severity: Severity,
    /// The human-readable advice text.
    pub message: String,
}

/// Roll-up counts per severity, for a textual summary line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    /// Count of `high` severity suggestions.
    pub high: usize,
    /// Count of `medium` severity suggestions.
    pub medium: usize,
    /// Count of `low` severity suggestions.
    pub low: usize,
}

impl Summary {
    /// Rolls up a suggestion list's severities into counts.
    pub fn of(suggestions: &[Suggestion]) -> Self {
        let mut s = Summary::default();
        for suggestion in suggestions {
            match suggestion.severity {
                Severity::High => s.high += 1,
                Severity::Medium => s.medium += 1,
                Severity::Low => s.low += 1,
            }
        }
        s
    }
}

/// Runs every family in `families` over `procedures`, returning suggestions
/// ranked by severity descending (ties broken by module, then procedure
/// name, to keep output deterministic).
pub fn advise(
    procedures: &[(String, Procedure)],
    families: &[Family],
) -> Vec<Suggestion> {
    let mut out = Vec::new();
    for (module_name, proc) in procedures {
        if families.contains(&Family::Complexity) {
            if proc.complexity > 15 {
                out.push(Suggestion {
                    module_name: module_name.clone(),
                    procedure_name: proc.name.clone(),
                    family: Family::Complexity,
                    severity: Severity::High,
                    message: "split".to_string(),
                });
            } else if proc.complexity > 10 {
                out.push(Suggestion {
                    module_name: module_name.clone(),
                    procedure_name: proc.name.clone(),
                    family: Family::Complexity,
                    severity: Severity::Medium,
                    message: "consider refactoring".to_string(),
                });
            }
        }
        if families.contains(&Family::Naming) {
            if proc.name.len() < 3 {
                out.push(Suggestion {
                    module_name: module_name.clone(),
                    procedure_name: proc.name.clone(),
                    family: Family::Naming,
                    severity: Severity::Low,
                    message: "procedure name is too short".to_string(),
                });
            }
            if proc
                .name
                .chars()
                .next()
                .map(|c| c.is_lowercase())
                .unwrap_or(false)
            {
                out.push(Suggestion {
                    module_name: module_name.clone(),
                    procedure_name: proc.name.clone(),
                    family: Family::Naming,
                    severity: Severity::Low,
                    message: "PascalCase expected".to_string(),
                });
            }
        }
        if families.contains(&Family::Structure) {
            let span = proc.end_line.saturating_sub(proc.start_line) + 1;
            if span > 50 {
                out.push(Suggestion {
                    module_name: module_name.clone(),
                    procedure_name: proc.name.clone(),
                    family: Family::Structure,
                    severity: Severity::Medium,
                    message: "long procedure".to_string(),
                });
            }
        }
    }
    out.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.module_name.cmp(&b.module_name))
            .then_with(|| a.procedure_name.cmp(&b.procedure_name))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ProcKind, Visibility};

    fn proc(name: &str, complexity: u32, start_line: usize, end_line: usize) -> Procedure {
        Procedure {
            name: name.to_string(),
            kind: ProcKind::Sub,
            visibility: Visibility::Public,
            start_line,
            end_line,
            calls: vec![],
            complexity,
        }
    }

    #[test]
    fn high_complexity_suggests_split() {
        let procedures = vec![("M".to_string(), proc("DoWork", 16, 1, 2))];
        let suggestions = advise(&procedures, &Family::matching("all"));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].severity, Severity::High);
        assert_eq!(suggestions[0].message, "split");
    }

    #[test]
    fn filter_selects_only_the_requested_family() {
        let procedures = vec![("M".to_string(), proc("x", 1, 1, 2))];
        let suggestions = advise(&procedures, &Family::matching("naming"));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].family, Family::Naming);
    }

    #[test]
    fn summary_counts_by_severity() {
        let procedures = vec![
            ("M".to_string(), proc("DoWork", 16, 1, 2)),
            ("M".to_string(), proc("Medium", 11, 1, 2)),
        ];
        let suggestions = advise(&procedures, &Family::matching("complexity"));
        let summary = Summary::of(&suggestions);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.medium, 1);
        assert_eq!(summary.low, 0);
    }
}
