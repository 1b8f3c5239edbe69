//! Macro-invocation bridge (C13): enumerates the public macros a project
//! exposes and invokes them by trying a family-specific list of candidate
//! invocation strings, bracketed by a guaranteed automation-security
//! restore.
use crate::error::{AutomationError, Result};
use crate::session::{AppFamily, AutomationValue, SessionManager};
use std::path::Path;
use vba_core::parser::{parse_procedures, ProcKind, Visibility};

/// A public callable signature recovered from a module's source.
#[derive(Debug, Clone)]
pub struct MacroSignature {
    /// The component it was declared in.
    pub module: String,
    /// The procedure name.
    pub name: String,
    /// Whether it's a `Sub` or a `Function`.
    pub kind: ProcKind,
    /// The opener line, trimmed, as written.
    pub signature: String,
    /// Declared return type; `Sub`s and functions without an explicit `As`
    /// clause default to `"Variant"`.
    pub return_type: String,
}

/// Matches a trailing `As TypeName` clause on a `Function` opener line, to
/// recover its declared return type.
static RETURN_TYPE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)\)\s*As\s+([A-Za-z_][A-Za-z0-9_.]*)\s*$").unwrap());

fn return_type_of(opener_line: &str, kind: ProcKind) -> String {
    if !matches!(kind, ProcKind::Function) {
        return "Variant".to_string();
    }
    RETURN_TYPE
        .captures(opener_line.trim_end())
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "Variant".to_string())
}

/// Walks every component's source and collects its public `Sub`/`Function`
/// signatures, the same declarations the host's own macro picker would
/// offer.
pub fn enumerate_macros(sessions: &SessionManager, path: &Path) -> Result<Vec<MacroSignature>> {
    let modules = sessions.with_session(path, |s| s.binding().list_components())?;
    let mut signatures = Vec::new();
    for module in modules {
        let source = sessions.with_session(path, |s| s.binding().component_source(&module))?;
        let lines: Vec<&str> = source.lines().collect();
        for proc in parse_procedures(&source) {
            if proc.visibility != Visibility::Public || !matches!(proc.kind, ProcKind::Sub | ProcKind::Function) {
                continue;
            }
            let opener = lines.get(proc.start_line - 1).copied().unwrap_or_default();
            signatures.push(MacroSignature {
                module: module.clone(),
                name: proc.name,
                kind: proc.kind,
                signature: opener.trim().to_string(),
                return_type: return_type_of(opener, proc.kind),
            });
        }
    }
    Ok(signatures)
}

/// Flat macro names across every component, in the shape
/// [`crate::error::AutomationError::MacroNotFound`]'s `available` field
/// wants and [`crate::session::HostBinding::list_macros`] reports.
fn available_names(sessions: &SessionManager, path: &Path) -> Vec<String> {
    sessions.with_session(path, |s| s.binding().list_macros()).unwrap_or_default()
}

/// Builds the family-specific ordered list of invocation strings to try for
/// a macro reference that may or may not carry a `MODULE.` prefix.
fn candidates(family: AppFamily, file_name: &str, module: Option<&str>, name: &str) -> Vec<String> {
    match family {
        AppFamily::Spreadsheet => match module {
            Some(module) => vec![
                format!("{module}.{name}"),
                format!("'{file_name}'!{module}.{name}"),
                name.to_string(),
            ],
            None => vec![name.to_string(), format!("'{file_name}'!{name}")],
        },
        AppFamily::Word | AppFamily::Database => match module {
            Some(module) => vec![name.to_string(), format!("{module}.{name}")],
            None => vec![name.to_string()],
        },
    }
}

/// Splits a `MODULE.NAME` or bare `NAME` macro reference.
fn split_reference(macro_ref: &str) -> (Option<&str>, &str) {
    match macro_ref.rsplit_once('.') {
        Some((module, name)) => (Some(module), name),
        None => (None, macro_ref),
    }
}

/// Lowers the host's automation-security level for the duration of `f`,
/// restoring the original value on every exit path (success, error, or
/// panic), mirroring [`crate::data_io::write_range`]'s manual-recalculation
/// bracket.
fn with_lowered_security<T>(sessions: &SessionManager, path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let original = sessions.with_session(path, |s| s.binding().get_property("Application", "AutomationSecurity"))?;
    sessions.with_session(path, |s| s.binding().put_property("Application", "AutomationSecurity", AutomationValue::Int(1)))?;
    let restore = scopeguard::guard(original, |original| {
        let _ = sessions.with_session(path, |s| s.binding().put_property("Application", "AutomationSecurity", original));
    });
    let result = f();
    drop(restore);
    result
}

/// Invokes `macro_ref` (`MODULE.NAME` or bare `NAME`) with `args`, trying
/// each family-specific candidate invocation string until one succeeds.
/// When `enable_macros` is set, brackets the attempt in a temporarily
/// lowered automation-security level.
pub fn invoke_macro(
    sessions: &SessionManager,
    path: &Path,
    macro_ref: &str,
    args: &[AutomationValue],
    enable_macros: bool,
) -> Result<AutomationValue> {
    let (module, name) = split_reference(macro_ref);
    let family = sessions.with_session(path, |s| Ok(s.family))?;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let tried = candidates(family, file_name, module, name);

    let run = || -> Result<AutomationValue> {
        let mut last_err = None;
        for candidate in &tried {
            match sessions.mutate_session(path, |b| b.run_macro(candidate, args)) {
                Ok(value) => return Ok(value),
                Err(e) => last_err = Some(e),
            }
        }
        let _ = last_err;
        Err(AutomationError::MacroNotFound {
            name: macro_ref.to_string(),
            tried: tried.clone(),
            available: available_names(sessions, path),
        })
    };

    if enable_macros {
        with_lowered_security(sessions, path, run)
    } else {
        run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{Inner, RecordingBinding};
    use crate::session::{BindingFactory, HostBinding, SessionManagerConfig};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    fn manager_with(factory: BindingFactory) -> Arc<SessionManager> {
        SessionManager::new(factory, SessionManagerConfig::default())
    }

    fn manager_failing_run_macro() -> Arc<SessionManager> {
        let inner: Arc<Mutex<Inner>> = Inner::shared();
        inner.lock().unwrap().fail_run_macro = true;
        let factory: BindingFactory =
            Arc::new(move |family| Box::new(RecordingBinding::shared(family, Arc::clone(&inner))) as Box<dyn HostBinding>);
        SessionManager::new(factory, SessionManagerConfig::default())
    }

    #[test]
    fn return_type_defaults_to_variant_without_an_as_clause() {
        assert_eq!(return_type_of("Public Function DoThing()", ProcKind::Function), "Variant");
    }

    #[test]
    fn return_type_is_read_from_a_trailing_as_clause() {
        assert_eq!(return_type_of("Public Function DoThing() As Long", ProcKind::Function), "Long");
    }

    #[test]
    fn subs_always_default_to_variant() {
        assert_eq!(return_type_of("Public Sub DoThing() As Long", ProcKind::Sub), "Variant");
    }

    #[test]
    fn splits_module_qualified_references() {
        assert_eq!(split_reference("Module1.DoThing"), (Some("Module1"), "DoThing"));
        assert_eq!(split_reference("DoThing"), (None, "DoThing"));
    }

    #[test]
    fn spreadsheet_candidates_try_module_qualified_forms_first() {
        let list = candidates(AppFamily::Spreadsheet, "Book1.xlsm", Some("Module1"), "DoThing");
        assert_eq!(
            list,
            vec![
                "Module1.DoThing".to_string(),
                "'Book1.xlsm'!Module1.DoThing".to_string(),
                "DoThing".to_string(),
            ]
        );
    }

    #[test]
    fn database_candidates_never_use_the_module_prefixed_form_first() {
        let list = candidates(AppFamily::Database, "db.accdb", Some("Module1"), "DoThing");
        assert_eq!(list, vec!["DoThing".to_string(), "Module1.DoThing".to_string()]);
    }

    #[test]
    fn enumerate_macros_collects_public_subs_and_functions_only() {
        let factory: BindingFactory = Arc::new(|family| Box::new(RecordingBinding::new(family)) as Box<dyn HostBinding>);
        let sessions = manager_with(factory);
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        sessions.get_or_create(file.path(), false).unwrap();
        sessions
            .mutate_session(file.path(), |b| {
                b.add_component(
                    "Module1",
                    "Private Sub Hidden()\nEnd Sub\n\nPublic Function Compute() As Long\n    Compute = 1\nEnd Function",
                )
            })
            .unwrap();

        let macros = enumerate_macros(&sessions, file.path()).unwrap();
        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].name, "Compute");
        assert_eq!(macros[0].return_type, "Long");
    }

    #[test]
    fn invoke_macro_reports_every_candidate_tried_on_failure() {
        let sessions = manager_failing_run_macro();
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        sessions.get_or_create(file.path(), false).unwrap();

        let err = invoke_macro(&sessions, file.path(), "Module1.DoThing", &[], false).unwrap_err();
        match err {
            AutomationError::MacroNotFound { name, tried, .. } => {
                assert_eq!(name, "Module1.DoThing");
                assert_eq!(tried.len(), 3);
            }
            other => panic!("expected MacroNotFound, got {other:?}"),
        }
    }

    #[test]
    fn security_bracket_restores_the_original_level_even_on_failure() {
        let sessions = manager_failing_run_macro();
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        sessions.get_or_create(file.path(), false).unwrap();

        let before = sessions
            .with_session(file.path(), |s| s.binding().get_property("Application", "AutomationSecurity"))
            .unwrap();
        let _ = invoke_macro(&sessions, file.path(), "DoThing", &[], true);
        let after = sessions
            .with_session(file.path(), |s| s.binding().get_property("Application", "AutomationSecurity"))
            .unwrap();
        assert_eq!(format!("{before:?}"), format!("{after:?}"));
    }
}
