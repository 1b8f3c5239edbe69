//! Edit pipeline (C11): validate, open, mutate, compile, save,
//! re-read-verify and roll back on any failure.
use crate::backup::BackupManager;
use crate::error::{AutomationError, Result};
use crate::session::{AppFamily, SessionManager};
use crate::validate;
use std::path::Path;
use tracing::{info, warn};

/// Whether a module was replaced or newly added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    /// The module didn't exist and was added as a standard module.
    Created,
    /// The module existed and its body was replaced.
    Updated,
}

/// The result of a successful [`inject_module`] call.
#[derive(Debug, Clone)]
pub struct InjectOutcome {
    /// Whether the module was created or updated.
    pub action: EditAction,
    /// Pre- and post-validation both passed.
    pub validated: bool,
    /// Post-save re-read confirmed the persisted body matched.
    pub verified: bool,
    /// The backup taken before mutating, if one was made.
    pub backup: Option<crate::backup::BackupEntry>,
}

/// Access/Excel-default lines a host automatically stamps onto new modules;
/// ignored when comparing persisted content to what was written.
const HOST_DEFAULT_LINES: &[&str] = &[
    "Option Compare Database",
    "Option Compare Text",
    "Option Compare Binary",
];

/// Normalizes a module body for the post-save comparison: strips trailing
/// whitespace per line, drops host-injected default header lines, and trims
/// leading/trailing blank lines.
fn normalize(code: &str) -> String {
    let mut lines: Vec<&str> = code
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !HOST_DEFAULT_LINES.contains(&l.trim()))
        .collect();
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Replaces or creates `module_name` in the container at `path` with
/// `code`, following §4.11 step by step: pre-validate, optionally back up,
/// open the session, mutate, force the host to re-parse, save, verify
/// persistence, and roll back on any failure from the mutate step onward.
pub fn inject_module(
    sessions: &SessionManager,
    backups: &BackupManager,
    path: &Path,
    module_name: &str,
    code: &str,
    make_backup: bool,
) -> Result<InjectOutcome> {
    validate::validate_ascii(code)?;
    validate::check_block_balance(code)?;

    let backup_entry = if make_backup {
        match backups.create() {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "could not take a pre-edit backup, continuing without one");
                None
            }
        }
    } else {
        None
    };

    sessions.get_or_create(path, false)?;
    let family = sessions.with_session(path, |s| Ok(s.family))?;

    let existing = sessions.with_session(path, |s| {
        let names = s.binding().list_components()?;
        Ok(names.into_iter().find(|n| n.eq_ignore_ascii_case(module_name)))
    })?;

    let (action, prior) = match &existing {
        Some(actual_name) => {
            let prior = sessions.with_session(path, |s| s.binding().component_source(actual_name))?;
            (EditAction::Updated, Some((actual_name.clone(), prior)))
        }
        None => (EditAction::Created, None),
    };

    let mutate_result = sessions.mutate_session(path, |binding| match &existing {
        Some(actual_name) => binding.set_component_source(actual_name, code),
        None => binding.add_component(module_name, code),
    });

    if let Err(e) = mutate_result {
        return Err(e);
    }

    let target_name = existing.clone().unwrap_or_else(|| module_name.to_string());

    if let Err(e) = sessions.with_session(path, |s| s.binding().force_reparse(&target_name)) {
        warn!(module = %target_name, error = %e, "post-validation failed, rolling back in-host mutation");
        let rollback = sessions.mutate_session(path, |binding| match &prior {
            Some((name, body)) => binding.set_component_source(name, body),
            None => binding.remove_component(&target_name),
        });
        if let Err(rollback_err) = rollback {
            warn!(error = %rollback_err, "rollback of the in-host mutation also failed");
        }
        return Err(e);
    }

    sessions.mutate_session(path, |binding| binding.save())?;
    info!(module = %target_name, ?action, "module saved");

    let verified = verify_persistence(sessions, family, path, &target_name, code)?;
    if !verified {
        return recover_from_mismatch(backups, &backup_entry, &target_name, family);
    }

    Ok(InjectOutcome {
        action,
        validated: true,
        verified: true,
        backup: backup_entry,
    })
}

/// §4.11 step 7: database sessions re-read through their own live project
/// handle (the file is exclusively locked by our host); other variants
/// close the write session and reopen the container read-only.
fn verify_persistence(
    sessions: &SessionManager,
    family: AppFamily,
    path: &Path,
    module_name: &str,
    expected: &str,
) -> Result<bool> {
    let actual = if family == AppFamily::Database {
        sessions.with_session(path, |s| s.binding().component_source(module_name))?
    } else {
        sessions.close(path, false)?;
        sessions.get_or_create(path, true)?;
        let read_back = sessions.with_session(path, |s| s.binding().component_source(module_name));
        let _ = sessions.close(path, false);
        read_back?
    };
    Ok(normalize(&actual) == normalize(expected))
}

fn recover_from_mismatch(
    backups: &BackupManager,
    backup_entry: &Option<crate::backup::BackupEntry>,
    module_name: &str,
    family: AppFamily,
) -> Result<InjectOutcome> {
    match (family, backup_entry) {
        (AppFamily::Database, Some(entry)) => Err(AutomationError::VerificationFailed {
            module: module_name.to_string(),
            recovery: format!(
                "container is exclusively locked; restore manually from backup {}",
                entry.backup_id
            ),
        }),
        (AppFamily::Database, None) => Err(AutomationError::VerificationFailed {
            module: module_name.to_string(),
            recovery: "container is exclusively locked and no backup was taken".to_string(),
        }),
        (_, Some(entry)) => match backups.restore(&entry.backup_id) {
            Ok(()) => Err(AutomationError::VerificationFailed {
                module: module_name.to_string(),
                recovery: format!("restored from backup {}", entry.backup_id),
            }),
            Err(_) => Err(AutomationError::RollbackFailed(entry.backup_id.clone())),
        },
        (_, None) => Err(AutomationError::VerificationFailed {
            module: module_name.to_string(),
            recovery: "no backup was taken; manual recovery required".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupManager;
    use crate::session::test_support::{Inner, RecordingBinding};
    use crate::session::{BindingFactory, HostBinding, SessionManagerConfig};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    /// Backs every session the returned manager opens with the same shared
    /// state, so closing and reopening a session (as non-Database
    /// persistence verification does) still sees prior modules/sheets.
    fn manager() -> Arc<SessionManager> {
        let inner: Arc<Mutex<Inner>> = Inner::shared();
        let factory: BindingFactory =
            Arc::new(move |family| Box::new(RecordingBinding::shared(family, Arc::clone(&inner))) as Box<dyn HostBinding>);
        SessionManager::new(factory, SessionManagerConfig::default())
    }

    #[test]
    fn creates_a_new_module_and_verifies_it() {
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        let sessions = manager();
        let backups = BackupManager::new(file.path());
        let code = "Public Function TestFunction() As String\n    TestFunction = \"OK\"\nEnd Function";
        let outcome = inject_module(&sessions, &backups, file.path(), "IntegrationTest", code, true).unwrap();
        assert_eq!(outcome.action, EditAction::Created);
        assert!(outcome.validated);
        assert!(outcome.verified);
        assert!(outcome.backup.is_some());
    }

    #[test]
    fn updating_an_existing_module_reports_updated() {
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        let sessions = manager();
        let backups = BackupManager::new(file.path());
        let code = "Public Sub X()\nEnd Sub";
        inject_module(&sessions, &backups, file.path(), "Mod1", code, false).unwrap();
        let outcome = inject_module(&sessions, &backups, file.path(), "Mod1", code, false).unwrap();
        assert_eq!(outcome.action, EditAction::Updated);
    }

    #[test]
    fn rejects_unbalanced_blocks_without_touching_the_session() {
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        let sessions = manager();
        let backups = BackupManager::new(file.path());
        let bad = "Public Sub X()\n    If True Then\n        MsgBox \"x\"\nEnd Sub";
        let err = inject_module(&sessions, &backups, file.path(), "X", bad, false).unwrap_err();
        assert!(matches!(err, AutomationError::Validation(_)));
        assert!(sessions.open_paths().is_empty());
    }

    #[test]
    fn rejects_non_ascii_before_opening_a_session() {
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        let sessions = manager();
        let backups = BackupManager::new(file.path());
        let err = inject_module(&sessions, &backups, file.path(), "X", "MsgBox \"\u{2713}\"", false).unwrap_err();
        assert!(matches!(err, AutomationError::Validation(_)));
        assert!(sessions.open_paths().is_empty());
    }
}
