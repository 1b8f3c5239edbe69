//! Structure analyzer (C7): aggregates per-module parse results into
//! project-wide metrics and a top-offenders view.
use crate::parser::{Procedure, Visibility};
use crate::project::{Module, Project};
use std::collections::{BTreeMap, BTreeSet};

/// A procedure singled out in the top-offenders view, with enough context
/// to locate it without re-walking the whole project.
#[derive(Debug, Clone)]
pub struct Offender {
    /// The module the procedure lives in.
    pub module_name: String,
    /// The procedure name.
    pub procedure_name: String,
    /// Its cyclomatic complexity.
    pub complexity: u32,
}

/// A coarse, human-facing label for overall project complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Mean complexity ≤ 5.
    Good,
    /// Mean complexity ≤ 10.
    Moderate,
    /// Mean complexity > 10.
    High,
}

impl Quality {
    /// The label surfaced to callers: `"good"`, `"moderate"`, or `"high"`.
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Moderate => "moderate",
            Quality::High => "high",
        }
    }

    fn from_mean(mean: f64) -> Self {
        if mean <= 5.0 {
            Quality::Good
        } else if mean <= 10.0 {
            Quality::Moderate
        } else {
            Quality::High
        }
    }
}

/// Project-wide structural metrics.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Total module count.
    pub total_modules: usize,
    /// Total procedure count across all modules.
    pub total_procedures: usize,
    /// Sum of every module's `line_count`.
    pub total_lines: usize,
    /// Mean complexity across all procedures; `0.0` if there are none.
    pub mean_complexity: f64,
    /// Max complexity across all procedures; `0` if there are none.
    pub max_complexity: u32,
    /// Human-facing quality label, thresholded on `mean_complexity`.
    pub quality: Quality,
    /// Procedures ordered by complexity descending, capped at `top_n`.
    pub top_offenders: Vec<Offender>,
}

/// Default cap on the top-offenders view.
pub const DEFAULT_TOP_N: usize = 15;

/// Parses every module's source and computes project-wide metrics. The
/// module/procedure pairing for each parsed procedure is returned alongside
/// so callers (the refactor advisor, the service surface) don't need to
/// re-parse.
pub fn analyze(project: &Project, top_n: usize) -> (Metrics, Vec<(String, Procedure)>) {
    let mut all: Vec<(String, Procedure)> = Vec::new();
    let mut total_lines = 0usize;
    for module in &project.modules {
        total_lines += module.line_count;
        for proc in crate::parser::parse_procedures(&module.code) {
            all.push((module.name.clone(), proc));
        }
    }

    let total_procedures = all.len();
    let total_modules = project.modules.len();
    let (mean_complexity, max_complexity) = if all.is_empty() {
        (0.0, 0)
    } else {
        let sum: u64 = all.iter().map(|(_, p)| p.complexity as u64).sum();
        let max = all.iter().map(|(_, p)| p.complexity).max().unwrap_or(0);
        (sum as f64 / all.len() as f64, max)
    };

    let mut ranked: Vec<&(String, Procedure)> = all.iter().collect();
    ranked.sort_by(|a, b| b.1.complexity.cmp(&a.1.complexity));
    let top_offenders = ranked
        .into_iter()
        .take(top_n)
        .map(|(module_name, proc)| Offender {
            module_name: module_name.clone(),
            procedure_name: proc.name.clone(),
            complexity: proc.complexity,
        })
        .collect();

    let metrics = Metrics {
        total_modules,
        total_procedures,
        total_lines,
        mean_complexity,
        max_complexity,
        quality: Quality::from_mean(mean_complexity),
        top_offenders,
    };
    (metrics, all)
}

/// Looks up a module by case-insensitive name, as every consumer-facing
/// operation that takes an optional `module_name` argument needs to.
pub fn find_module<'a>(project: &'a Project, name: &str) -> Option<&'a Module> {
    project.modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// A module's best-effort cross-module call hints: the other modules whose
/// public procedure names match one of this module's call targets by name.
/// This is not true static dependency resolution (VBA's implicit scoping
/// makes that unreliable without a full type-bound resolver) and is kept
/// distinct from the project schema's `dependencies` field, which callers
/// must tolerate as always empty.
#[derive(Debug, Clone)]
pub struct DependencyHint {
    /// The module these hints are about.
    pub module_name: String,
    /// Other modules that declare a public procedure matching one of this
    /// module's call targets, sorted and deduplicated.
    pub possible_callees: Vec<String>,
}

/// Computes [`DependencyHint`]s for every module in `project`: a procedure
/// name is attributed to whichever module(s) declare a same-named public
/// `Sub`/`Function`/`Property`, then each module's own call targets are
/// matched against that ownership map.
pub fn dependency_hints(project: &Project) -> Vec<DependencyHint> {
    let mut owners: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut per_module_calls: Vec<(String, BTreeSet<String>)> = Vec::with_capacity(project.modules.len());

    for module in &project.modules {
        let procedures = crate::parser::parse_procedures(&module.code);
        let mut calls = BTreeSet::new();
        for proc in &procedures {
            if proc.visibility == Visibility::Public {
                owners.entry(proc.name.to_ascii_lowercase()).or_default().insert(module.name.clone());
            }
            calls.extend(proc.calls.iter().cloned());
        }
        per_module_calls.push((module.name.clone(), calls));
    }

    per_module_calls
        .into_iter()
        .map(|(module_name, calls)| {
            let mut possible_callees = BTreeSet::new();
            for call in &calls {
                if let Some(declaring_modules) = owners.get(&call.to_ascii_lowercase()) {
                    for declaring_module in declaring_modules {
                        if !declaring_module.eq_ignore_ascii_case(&module_name) {
                            possible_callees.insert(declaring_module.clone());
                        }
                    }
                }
            }
            DependencyHint { module_name, possible_callees: possible_callees.into_iter().collect() }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ModuleKind;

    fn project_with(code: &str) -> Project {
        Project {
            name: None,
            codepage: None,
            modules: vec![Module {
                name: "TestModule".into(),
                kind: ModuleKind::Standard,
                code: code.into(),
                line_count: code.lines().count().max(1),
            }],
        }
    }

    #[test]
    fn matches_the_seed_scenario_metrics() {
        let code = "Public Function HelloWorld() As String\n    HelloWorld = \"Hello from VBA!\"\nEnd Function";
        let project = project_with(code);
        let (metrics, _) = analyze(&project, DEFAULT_TOP_N);
        assert_eq!(metrics.total_modules, 1);
        assert_eq!(metrics.total_procedures, 1);
        assert_eq!(metrics.total_lines, 3);
        assert_eq!(metrics.mean_complexity, 1.0);
        assert_eq!(metrics.max_complexity, 1);
        assert_eq!(metrics.quality, Quality::Good);
    }

    #[test]
    fn top_offenders_are_capped_and_sorted_descending() {
        let code = (0..20)
            .map(|i| format!("Sub P{i}()\nIf a Then\nEnd If\nEnd Sub"))
            .collect::<Vec<_>>()
            .join("\n");
        let project = project_with(&code);
        let (metrics, _) = analyze(&project, 5);
        assert_eq!(metrics.top_offenders.len(), 5);
    }

    fn two_module_project(caller: &str, callee: &str) -> Project {
        Project {
            name: None,
            codepage: None,
            modules: vec![
                Module { name: "Caller".into(), kind: ModuleKind::Standard, code: caller.into(), line_count: caller.lines().count().max(1) },
                Module { name: "Callee".into(), kind: ModuleKind::Standard, code: callee.into(), line_count: callee.lines().count().max(1) },
            ],
        }
    }

    #[test]
    fn dependency_hints_attribute_calls_to_the_declaring_module() {
        let project = two_module_project(
            "Public Sub Run()\n    DoWork 1\nEnd Sub",
            "Public Sub DoWork(n As Long)\nEnd Sub",
        );
        let hints = dependency_hints(&project);
        let caller = hints.iter().find(|h| h.module_name == "Caller").unwrap();
        assert_eq!(caller.possible_callees, vec!["Callee".to_string()]);
        let callee = hints.iter().find(|h| h.module_name == "Callee").unwrap();
        assert!(callee.possible_callees.is_empty());
    }

    #[test]
    fn dependency_hints_ignore_private_procedures_in_other_modules() {
        let project = two_module_project(
            "Public Sub Run()\n    Hidden\nEnd Sub",
            "Private Sub Hidden()\nEnd Sub",
        );
        let hints = dependency_hints(&project);
        let caller = hints.iter().find(|h| h.module_name == "Caller").unwrap();
        assert!(caller.possible_callees.is_empty());
    }

    #[test]
    fn dependency_hints_never_list_a_modules_own_name() {
        let code = "Public Sub Run()\n    Helper\nEnd Sub\n\nPublic Sub Helper()\nEnd Sub";
        let project = project_with(code);
        let hints = dependency_hints(&project);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].possible_callees.is_empty());
    }
}
